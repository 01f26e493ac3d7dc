use serde::Serialize;

use crate::analytics::{
    class_segment, distinct_classes, fee_breakdown, low_attendance, summary_metrics,
    FeeStatusBreakdown, SummaryMetrics, ATTENDANCE_THRESHOLD,
};
use crate::config::{AppConfig, DEFAULT_CURRENCY};
use crate::data::{format_number, StudentRecord, StudentTable};
use crate::error::ParseError;

pub const TITLE: &str = "School Student Dashboard";
pub const NO_FILE_MESSAGE: &str = "Please upload a student data file to view the dashboard.";
pub const GOOD_ATTENDANCE_MESSAGE: &str = "All students have good attendance this month!";
pub const NO_DATA: &str = "no data";

#[derive(Clone, Debug)]
pub struct RenderOptions {
    pub currency: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions {
            currency: DEFAULT_CURRENCY.to_string(),
        }
    }
}

impl From<&AppConfig> for RenderOptions {
    fn from(cfg: &AppConfig) -> Self {
        RenderOptions {
            currency: cfg.currency.clone(),
        }
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct MetricTile {
    pub label: String,
    pub value: String,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct DataTable {
    pub title: String,
    pub columns: Vec<String>,
    pub rows: Vec<StudentRecord>,
    pub sortable: bool,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct PieSlice {
    pub label: String,
    pub count: usize,
    /// Share of the slice, rounded to one decimal. `None` when both counts are zero.
    pub percentage: Option<f64>,
    pub color: String,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct PieChart {
    pub title: String,
    pub slices: Vec<PieSlice>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Bar {
    pub label: String,
    pub value: Option<f64>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct BarChart {
    pub title: String,
    pub bars: Vec<Bar>,
    pub y_label: String,
    pub color: String,
    pub label_rotation: u16,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LowAttendancePanel {
    Table(DataTable),
    Info { title: String, message: String },
}

/// Everything the page draws for one table and one class selection.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Dashboard {
    pub title: String,
    pub classes: Vec<String>,
    pub selected_class: Option<String>,
    pub metrics: SummaryMetrics,
    pub tiles: Vec<MetricTile>,
    pub class_table: DataTable,
    pub fee_breakdown: FeeStatusBreakdown,
    pub fee_chart: PieChart,
    pub attendance_chart: BarChart,
    pub low_attendance: LowAttendancePanel,
}

/// Page state handed to the browser.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DashboardView {
    Waiting { message: String },
    Failed { message: String },
    Ready(Dashboard),
}

impl DashboardView {
    pub fn waiting() -> Self {
        DashboardView::Waiting {
            message: NO_FILE_MESSAGE.to_string(),
        }
    }

    /// A parse failure blocks the whole page; nothing partial is rendered.
    pub fn from_load(
        loaded: Result<StudentTable, ParseError>,
        selected_class: Option<&str>,
        options: &RenderOptions,
    ) -> Self {
        match loaded {
            Ok(table) => DashboardView::Ready(render(&table, selected_class, options)),
            Err(err) => DashboardView::Failed {
                message: err.to_string(),
            },
        }
    }
}

/// Builds every widget from the table and the current selection.
///
/// Metrics always cover the full table; the class table and the charts cover
/// only the selected class. Without a selection the first class is used.
pub fn render(
    table: &StudentTable,
    selected_class: Option<&str>,
    options: &RenderOptions,
) -> Dashboard {
    let metrics = summary_metrics(table);
    let classes = distinct_classes(table);
    let selected = selected_class
        .map(str::to_string)
        .or_else(|| classes.first().cloned());

    let segment = match selected.as_deref() {
        Some(class) => class_segment(table, class),
        None => Vec::new(),
    };
    let breakdown = fee_breakdown(&segment);
    let low = low_attendance(&segment, ATTENDANCE_THRESHOLD);

    let class_title = match selected.as_deref() {
        Some(class) => format!("Students in {}", class),
        None => "Students".to_string(),
    };
    let low_title = format!(
        "Students with < {}% Attendance",
        format_number(ATTENDANCE_THRESHOLD)
    );

    let low_attendance = if low.is_empty() {
        LowAttendancePanel::Info {
            title: low_title,
            message: GOOD_ATTENDANCE_MESSAGE.to_string(),
        }
    } else {
        LowAttendancePanel::Table(data_table(low_title, table, &low))
    };

    Dashboard {
        title: TITLE.to_string(),
        tiles: metric_tiles(&metrics, &options.currency),
        metrics,
        classes,
        selected_class: selected,
        class_table: data_table(class_title, table, &segment),
        fee_breakdown: breakdown,
        fee_chart: fee_chart(&breakdown),
        attendance_chart: attendance_chart(&segment),
        low_attendance,
    }
}

fn metric_tiles(metrics: &SummaryMetrics, currency: &str) -> Vec<MetricTile> {
    let tile = |label: &str, value: String| MetricTile {
        label: label.to_string(),
        value,
    };

    vec![
        tile("Total Students", metrics.total_students.to_string()),
        tile("Fees Collected", format_currency(metrics.fees_collected, currency)),
        tile("Fees Due", format_currency(metrics.fees_due, currency)),
        tile("Avg. Attendance", format_percent(metrics.avg_attendance)),
    ]
}

fn data_table(title: String, table: &StudentTable, rows: &[&StudentRecord]) -> DataTable {
    DataTable {
        title,
        columns: table.columns(),
        rows: rows.iter().map(|r| (*r).clone()).collect(),
        sortable: true,
    }
}

fn fee_chart(breakdown: &FeeStatusBreakdown) -> PieChart {
    let total = breakdown.total();
    let slice = |label: &str, count: usize, color: &str| PieSlice {
        label: label.to_string(),
        count,
        percentage: share(count, total),
        color: color.to_string(),
    };

    PieChart {
        title: "Fee Payment Overview".to_string(),
        slices: vec![
            slice("Paid", breakdown.paid_count, "green"),
            slice("Unpaid", breakdown.unpaid_count, "red"),
        ],
    }
}

fn attendance_chart(segment: &[&StudentRecord]) -> BarChart {
    BarChart {
        title: "Attendance Chart".to_string(),
        bars: segment
            .iter()
            .map(|r| Bar {
                label: r.name.clone().unwrap_or_default(),
                value: r.attendance,
            })
            .collect(),
        y_label: "Attendance %".to_string(),
        color: "skyblue".to_string(),
        label_rotation: 45,
    }
}

fn share(count: usize, total: usize) -> Option<f64> {
    if total == 0 {
        return None;
    }
    Some(round1(count as f64 * 100.0 / total as f64))
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Currency amount with the symbol after any minus sign. Whole amounts print
/// without decimals, anything else with two.
pub fn format_currency(amount: f64, symbol: &str) -> String {
    let sign = if amount < 0.0 { "-" } else { "" };
    let magnitude = amount.abs();
    let digits = if magnitude.fract() == 0.0 {
        format_number(magnitude)
    } else {
        format!("{:.2}", magnitude)
    };
    format!("{}{}{}", sign, symbol, digits)
}

pub fn format_percent(value: Option<f64>) -> String {
    match value {
        Some(pct) => format!("{:.1}%", pct),
        None => NO_DATA.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::load_csv;

    const CSV: &str = "Name,Class,Total Fees,Fees Paid,Attendance (%)\n\
                       A,5,1000,1000,80\n\
                       B,5,1000,500,60\n\
                       C,6,800,800,95\n";

    fn table() -> StudentTable {
        load_csv(CSV.as_bytes()).unwrap()
    }

    #[test]
    fn defaults_to_first_class() {
        let dashboard = render(&table(), None, &RenderOptions::default());
        assert_eq!(dashboard.classes, vec!["5", "6"]);
        assert_eq!(dashboard.selected_class.as_deref(), Some("5"));
        assert_eq!(dashboard.class_table.title, "Students in 5");
        assert_eq!(dashboard.class_table.rows.len(), 2);
    }

    #[test]
    fn tiles_are_formatted() {
        let dashboard = render(&table(), Some("5"), &RenderOptions::default());
        let values: Vec<_> = dashboard.tiles.iter().map(|t| t.value.as_str()).collect();
        let labels: Vec<_> = dashboard.tiles.iter().map(|t| t.label.as_str()).collect();
        assert_eq!(
            labels,
            vec!["Total Students", "Fees Collected", "Fees Due", "Avg. Attendance"]
        );
        assert_eq!(values, vec!["3", "₹2300", "₹500", "78.3%"]);
    }

    #[test]
    fn pie_carries_counts_and_percentages() {
        let dashboard = render(&table(), Some("5"), &RenderOptions::default());
        let slices = &dashboard.fee_chart.slices;
        assert_eq!(slices[0].label, "Paid");
        assert_eq!(slices[0].count, 1);
        assert_eq!(slices[0].percentage, Some(50.0));
        assert_eq!(slices[0].color, "green");
        assert_eq!(slices[1].label, "Unpaid");
        assert_eq!(slices[1].percentage, Some(50.0));
        assert_eq!(slices[1].color, "red");
    }

    #[test]
    fn bar_chart_is_keyed_by_name() {
        let dashboard = render(&table(), Some("5"), &RenderOptions::default());
        let chart = &dashboard.attendance_chart;
        assert_eq!(chart.label_rotation, 45);
        assert_eq!(chart.y_label, "Attendance %");
        assert_eq!(
            chart.bars,
            vec![
                Bar { label: "A".into(), value: Some(80.0) },
                Bar { label: "B".into(), value: Some(60.0) },
            ]
        );
    }

    #[test]
    fn low_attendance_table_or_info() {
        let dashboard = render(&table(), Some("5"), &RenderOptions::default());
        match &dashboard.low_attendance {
            LowAttendancePanel::Table(t) => {
                assert_eq!(t.title, "Students with < 75% Attendance");
                assert_eq!(t.rows.len(), 1);
                assert_eq!(t.rows[0].name.as_deref(), Some("B"));
            }
            other => panic!("expected table, got {:?}", other),
        }

        let dashboard = render(&table(), Some("6"), &RenderOptions::default());
        assert_eq!(
            dashboard.low_attendance,
            LowAttendancePanel::Info {
                title: "Students with < 75% Attendance".to_string(),
                message: GOOD_ATTENDANCE_MESSAGE.to_string(),
            }
        );
    }

    #[test]
    fn unknown_class_renders_empty_segment_with_full_metrics() {
        let dashboard = render(&table(), Some("12"), &RenderOptions::default());
        assert!(dashboard.class_table.rows.is_empty());
        assert_eq!(dashboard.metrics.total_students, 3);
        assert!(dashboard.attendance_chart.bars.is_empty());
        assert!(dashboard.fee_chart.slices.iter().all(|s| s.percentage.is_none()));
        assert!(matches!(
            dashboard.low_attendance,
            LowAttendancePanel::Info { .. }
        ));
    }

    #[test]
    fn extra_upload_columns_reach_both_tables() {
        let csv = "Roll No,Name,Class,Total Fees,Fees Paid,Attendance (%),Phone\n\
                   17,A,5,1000,1000,80,555-0101\n\
                   18,B,5,1000,500,60,\n";
        let table = load_csv(csv.as_bytes()).unwrap();
        let dashboard = render(&table, Some("5"), &RenderOptions::default());

        let expected = vec![
            "Name",
            "Class",
            "Total Fees",
            "Fees Paid",
            "Attendance (%)",
            "Roll No",
            "Phone",
        ];
        assert_eq!(dashboard.class_table.columns, expected);
        assert_eq!(dashboard.class_table.rows[0].extra["Phone"].as_deref(), Some("555-0101"));

        let low = match &dashboard.low_attendance {
            LowAttendancePanel::Table(t) => t,
            other => panic!("expected table, got {:?}", other),
        };
        assert_eq!(low.columns, expected);
        assert_eq!(low.rows[0].extra["Roll No"].as_deref(), Some("18"));

        let json = serde_json::to_value(&dashboard).unwrap();
        assert_eq!(json["low_attendance"]["rows"][0]["Roll No"], "18");
        assert!(json["low_attendance"]["rows"][0]["Phone"].is_null());
    }

    #[test]
    fn currency_formatting() {
        assert_eq!(format_currency(1500.0, "₹"), "₹1500");
        assert_eq!(format_currency(-200.0, "₹"), "-₹200");
        assert_eq!(format_currency(12.5, "$"), "$12.50");
        assert_eq!(format_currency(0.0, "₹"), "₹0");
    }

    #[test]
    fn percent_formatting() {
        assert_eq!(format_percent(Some(70.0)), "70.0%");
        assert_eq!(format_percent(Some(66.666)), "66.7%");
        assert_eq!(format_percent(None), "no data");
    }

    #[test]
    fn thirds_round_to_one_decimal() {
        assert_eq!(share(1, 3), Some(33.3));
        assert_eq!(share(2, 3), Some(66.7));
        assert_eq!(share(0, 0), None);
    }

    #[test]
    fn view_serializes_with_status_tag() {
        let json = serde_json::to_value(DashboardView::waiting()).unwrap();
        assert_eq!(json["status"], "waiting");
        assert_eq!(json["message"], NO_FILE_MESSAGE);

        let view = DashboardView::from_load(Ok(table()), Some("5"), &RenderOptions::default());
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["status"], "ready");
        assert_eq!(json["class_table"]["rows"][1]["Fees Paid"], 500.0);
        assert_eq!(json["low_attendance"]["kind"], "table");
    }
}
