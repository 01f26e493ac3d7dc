use serde::Serialize;
use std::collections::BTreeSet;

use crate::data::{StudentRecord, StudentTable};

/// Students strictly below this attendance percentage are flagged.
pub const ATTENDANCE_THRESHOLD: f64 = 75.0;

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct SummaryMetrics {
    pub total_students: usize,
    pub fees_collected: f64,
    pub fees_due: f64,
    /// `None` when no row has a recorded attendance.
    pub avg_attendance: Option<f64>,
}

#[derive(Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FeeStatusBreakdown {
    pub paid_count: usize,
    pub unpaid_count: usize,
}

impl FeeStatusBreakdown {
    pub fn total(&self) -> usize {
        self.paid_count + self.unpaid_count
    }
}

/// Rows of one class, borrowed from the table in their original order.
pub type ClassSegment<'a> = Vec<&'a StudentRecord>;

pub type LowAttendanceSet<'a> = Vec<&'a StudentRecord>;

/// Whole-table statistics. Absent cells are skipped by every sum and by the mean.
pub fn summary_metrics(table: &StudentTable) -> SummaryMetrics {
    let records = table.records();

    let fees_collected: f64 = records.iter().filter_map(|r| r.fees_paid).sum();
    let total_fees: f64 = records.iter().filter_map(|r| r.total_fees).sum();

    let attendance: Vec<f64> = records.iter().filter_map(|r| r.attendance).collect();
    let avg_attendance = if attendance.is_empty() {
        None
    } else {
        Some(attendance.iter().sum::<f64>() / attendance.len() as f64)
    };

    SummaryMetrics {
        total_students: records.len(),
        fees_collected,
        fees_due: total_fees - fees_collected,
        avg_attendance,
    }
}

/// Distinct class values, ascending, for the class selector.
pub fn distinct_classes(table: &StudentTable) -> Vec<String> {
    table
        .records()
        .iter()
        .filter_map(|r| r.class.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn class_segment<'a>(table: &'a StudentTable, class: &str) -> ClassSegment<'a> {
    table
        .records()
        .iter()
        .filter(|r| r.class.as_deref() == Some(class))
        .collect()
}

/// Counts paid (`Fees Paid >= Total Fees`) and unpaid rows. Overpayment counts
/// as paid. Rows missing either fee are left out of both counts.
pub fn fee_breakdown(segment: &[&StudentRecord]) -> FeeStatusBreakdown {
    segment
        .iter()
        .fold(FeeStatusBreakdown::default(), |mut acc, record| {
            match (record.fees_paid, record.total_fees) {
                (Some(paid), Some(total)) if paid >= total => acc.paid_count += 1,
                (Some(_), Some(_)) => acc.unpaid_count += 1,
                _ => {}
            }
            acc
        })
}

/// Rows with recorded attendance strictly below `threshold`, in segment order.
pub fn low_attendance<'a>(segment: &[&'a StudentRecord], threshold: f64) -> LowAttendanceSet<'a> {
    segment
        .iter()
        .copied()
        .filter(|r| matches!(r.attendance, Some(pct) if pct < threshold))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student(
        name: &str,
        class: &str,
        total: Option<f64>,
        paid: Option<f64>,
        attendance: Option<f64>,
    ) -> StudentRecord {
        StudentRecord {
            name: Some(name.to_string()),
            class: Some(class.to_string()),
            total_fees: total,
            fees_paid: paid,
            attendance,
            extra: Default::default(),
        }
    }

    fn two_student_table() -> StudentTable {
        StudentTable::new(vec![
            student("A", "5", Some(1000.0), Some(1000.0), Some(80.0)),
            student("B", "5", Some(1000.0), Some(500.0), Some(60.0)),
        ])
    }

    #[test]
    fn two_student_scenario() {
        let table = two_student_table();

        let metrics = summary_metrics(&table);
        assert_eq!(
            metrics,
            SummaryMetrics {
                total_students: 2,
                fees_collected: 1500.0,
                fees_due: 500.0,
                avg_attendance: Some(70.0),
            }
        );

        let segment = class_segment(&table, "5");
        assert_eq!(
            fee_breakdown(&segment),
            FeeStatusBreakdown {
                paid_count: 1,
                unpaid_count: 1
            }
        );

        let low = low_attendance(&segment, ATTENDANCE_THRESHOLD);
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].name.as_deref(), Some("B"));
    }

    #[test]
    fn fees_due_goes_negative_on_overpayment() {
        let table = StudentTable::new(vec![
            student("A", "5", Some(1000.0), Some(1200.0), None),
            student("B", "5", Some(300.0), Some(300.0), None),
        ]);
        let metrics = summary_metrics(&table);
        assert_eq!(metrics.fees_collected, 1500.0);
        assert_eq!(metrics.fees_due, 1300.0 - 1500.0);
        assert!(metrics.fees_due < 0.0);

        let segment = class_segment(&table, "5");
        assert_eq!(fee_breakdown(&segment).paid_count, 2);
    }

    #[test]
    fn missing_cells_are_skipped() {
        let table = StudentTable::new(vec![
            student("A", "5", Some(1000.0), None, Some(90.0)),
            student("B", "5", None, Some(400.0), None),
            student("C", "5", Some(500.0), Some(100.0), Some(70.0)),
        ]);

        let metrics = summary_metrics(&table);
        assert_eq!(metrics.total_students, 3);
        assert_eq!(metrics.fees_collected, 500.0);
        assert_eq!(metrics.fees_due, 1500.0 - 500.0);
        assert_eq!(metrics.avg_attendance, Some(80.0));

        let segment = class_segment(&table, "5");
        let breakdown = fee_breakdown(&segment);
        assert_eq!(breakdown.total(), 1);
        assert_eq!(breakdown.unpaid_count, 1);

        let low = low_attendance(&segment, ATTENDANCE_THRESHOLD);
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].name.as_deref(), Some("C"));
    }

    #[test]
    fn average_is_none_without_attendance() {
        let table = StudentTable::new(vec![student("A", "5", None, None, None)]);
        assert_eq!(summary_metrics(&table).avg_attendance, None);
        assert_eq!(summary_metrics(&StudentTable::default()).avg_attendance, None);
    }

    #[test]
    fn metrics_are_repeatable() {
        let table = two_student_table();
        assert_eq!(summary_metrics(&table), summary_metrics(&table));
    }

    #[test]
    fn classes_are_sorted_and_unique() {
        let table = StudentTable::new(vec![
            student("A", "7", None, None, None),
            student("B", "10", None, None, None),
            student("C", "7", None, None, None),
            student("D", "5", None, None, None),
            StudentRecord {
                class: None,
                ..student("E", "", None, None, None)
            },
        ]);
        assert_eq!(distinct_classes(&table), vec!["10", "5", "7"]);
    }

    #[test]
    fn segment_preserves_order_and_may_be_empty() {
        let table = StudentTable::new(vec![
            student("A", "5", None, None, None),
            student("B", "6", None, None, None),
            student("C", "5", None, None, None),
        ]);
        let names: Vec<_> = class_segment(&table, "5")
            .iter()
            .map(|r| r.name.clone().unwrap_or_default())
            .collect();
        assert_eq!(names, vec!["A", "C"]);
        assert!(class_segment(&table, "9").is_empty());
    }

    #[test]
    fn threshold_partitions_exactly_at_75() {
        let table = StudentTable::new(vec![
            student("A", "5", None, None, Some(74.9)),
            student("B", "5", None, None, Some(75.0)),
            student("C", "5", None, None, Some(75.1)),
            student("D", "5", None, None, Some(0.0)),
        ]);
        let segment = class_segment(&table, "5");
        let low = low_attendance(&segment, ATTENDANCE_THRESHOLD);

        let names: Vec<_> = low.iter().filter_map(|r| r.name.as_deref()).collect();
        assert_eq!(names, vec!["A", "D"]);
        for record in &segment {
            let flagged = low.iter().any(|l| std::ptr::eq(*l, *record));
            let below = record.attendance.map_or(false, |a| a < ATTENDANCE_THRESHOLD);
            assert_eq!(flagged, below);
        }
    }
}
