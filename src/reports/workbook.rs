//! Spreadsheet exports.
//!
//! A [`WorkbookSpec`] is plain data describing sheets, columns and typed
//! cells. [`render`] turns it into an xlsx file with the house styling and
//! [`render_export`] runs that on the blocking pool through a scratch file.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rust_xlsxwriter::{Color, ColNum, Format, FormatAlign, FormatBorder, RowNum, Workbook, Worksheet, XlsxError};

use crate::error::{AppError, AppResult};
use crate::models::{Transaction, Wallet};
use crate::reports::assembler::{
    CashFlowDirection, PortfolioRow, ReportData, SummaryReport, TransactionKind, TransactionSummary,
    WalletMetrics,
};
use crate::reports::filters::DateRange;
use crate::reports::scratch::ScratchFile;

const HEADER_FILL: u32 = 0x1F4E78;
const GOOD_FILL: u32 = 0xC6EFCE;
const WAITING_FILL: u32 = 0xFFEB9C;
const BAD_FILL: u32 = 0xFFC7CE;
const HEADER_ROW_HEIGHT: f64 = 24.0;
const MONEY_FORMAT: &str = "#,##0.00";
const PERCENT_FORMAT: &str = "0.00\"%\"";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Integer(i64),
    Money(f64),
    /// Already scaled to 0..=100.
    Percent(f64),
    Timestamp(DateTime<Utc>),
    Status(String),
    Empty,
}

impl Cell {
    fn text(value: Option<&str>) -> Self {
        value.map_or(Cell::Empty, |text| Cell::Text(text.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub header: &'static str,
    pub width: f64,
}

const fn column(header: &'static str, width: f64) -> Column {
    Column { header, width }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Cell>>,
    pub autofilter: bool,
}

impl Sheet {
    pub fn detail(name: &str, columns: Vec<Column>, rows: Vec<Vec<Cell>>) -> Self {
        Self {
            name: name.to_string(),
            columns,
            rows,
            autofilter: true,
        }
    }

    fn summary(rows: Vec<(&str, Cell)>) -> Self {
        Self {
            name: "Summary".to_string(),
            columns: vec![column("Metric", 32.0), column("Value", 24.0)],
            rows: rows
                .into_iter()
                .map(|(label, value)| vec![Cell::Text(label.to_string()), value])
                .collect(),
            autofilter: false,
        }
    }
}

/// An ordered set of sheets whose first sheet is always "Summary".
#[derive(Debug, Clone, PartialEq)]
pub struct WorkbookSpec {
    sheets: Vec<Sheet>,
}

impl WorkbookSpec {
    pub fn new(summary_rows: Vec<(&str, Cell)>) -> Self {
        Self {
            sheets: vec![Sheet::summary(summary_rows)],
        }
    }

    pub fn with_sheet(mut self, sheet: Sheet) -> Self {
        self.sheets.push(sheet);
        self
    }

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tone {
    Good,
    Waiting,
    Bad,
}

fn status_tone(status: &str) -> Option<Tone> {
    match status.trim().to_ascii_uppercase().as_str() {
        "APPROVED" | "ACTIVE" | "SUCCESS" => Some(Tone::Good),
        "PENDING" | "INACTIVE" => Some(Tone::Waiting),
        "REJECTED" | "FROZEN" | "FAILED" => Some(Tone::Bad),
        _ => None,
    }
}

struct Styles {
    header: Format,
    text: Format,
    integer: Format,
    money: Format,
    percent: Format,
    good: Format,
    waiting: Format,
    bad: Format,
}

impl Styles {
    fn new() -> Self {
        let body = Format::new().set_border(FormatBorder::Thin);
        let tinted = |fill: u32| body.clone().set_background_color(Color::RGB(fill));
        Self {
            header: Format::new()
                .set_bold()
                .set_font_color(Color::White)
                .set_background_color(Color::RGB(HEADER_FILL))
                .set_align(FormatAlign::Center)
                .set_align(FormatAlign::VerticalCenter)
                .set_border(FormatBorder::Thin),
            integer: body.clone().set_num_format("0"),
            money: body.clone().set_num_format(MONEY_FORMAT),
            percent: body.clone().set_num_format(PERCENT_FORMAT),
            good: tinted(GOOD_FILL),
            waiting: tinted(WAITING_FILL),
            bad: tinted(BAD_FILL),
            text: body,
        }
    }

    fn status(&self, status: &str) -> &Format {
        match status_tone(status) {
            Some(Tone::Good) => &self.good,
            Some(Tone::Waiting) => &self.waiting,
            Some(Tone::Bad) => &self.bad,
            None => &self.text,
        }
    }
}

fn render_failed(error: XlsxError) -> AppError {
    tracing::error!(error = %error, "Workbook rendering failed");
    AppError::Render("Could not render export.".to_string())
}

/// Writes `layout` as an xlsx file at `path`.
pub fn render(layout: &WorkbookSpec, path: &Path) -> AppResult<()> {
    let styles = Styles::new();
    let mut workbook = Workbook::new();
    for sheet in layout.sheets() {
        let worksheet = workbook.add_worksheet();
        write_sheet(worksheet, sheet, &styles).map_err(render_failed)?;
    }
    workbook.save(path).map_err(render_failed)
}

fn write_sheet(worksheet: &mut Worksheet, sheet: &Sheet, styles: &Styles) -> Result<(), XlsxError> {
    worksheet.set_name(sheet.name.as_str())?;

    for (index, column) in sheet.columns.iter().enumerate() {
        let col = index as ColNum;
        worksheet.set_column_width(col, column.width)?;
        worksheet.write_string_with_format(0, col, column.header, &styles.header)?;
    }
    worksheet.set_row_height(0, HEADER_ROW_HEIGHT)?;
    worksheet.set_freeze_panes(1, 0)?;

    for (row_index, cells) in sheet.rows.iter().enumerate() {
        let row = (row_index + 1) as RowNum;
        for (col_index, cell) in cells.iter().enumerate() {
            let col = col_index as ColNum;
            match cell {
                Cell::Text(text) => {
                    worksheet.write_string_with_format(row, col, text.as_str(), &styles.text)?;
                }
                Cell::Integer(value) => {
                    worksheet.write_number_with_format(row, col, *value as f64, &styles.integer)?;
                }
                Cell::Money(value) => {
                    worksheet.write_number_with_format(row, col, *value, &styles.money)?;
                }
                Cell::Percent(value) => {
                    worksheet.write_number_with_format(row, col, *value, &styles.percent)?;
                }
                Cell::Timestamp(value) => {
                    worksheet.write_string_with_format(
                        row,
                        col,
                        value.format(TIMESTAMP_FORMAT).to_string(),
                        &styles.text,
                    )?;
                }
                Cell::Status(status) => {
                    worksheet.write_string_with_format(row, col, status.as_str(), styles.status(status))?;
                }
                Cell::Empty => {
                    worksheet.write_blank(row, col, &styles.text)?;
                }
            }
        }
    }

    if sheet.autofilter && !sheet.columns.is_empty() {
        let last_col = (sheet.columns.len() - 1) as ColNum;
        worksheet.autofilter(0, 0, sheet.rows.len() as RowNum, last_col)?;
    }
    Ok(())
}

/// Renders on the blocking pool into a scratch file and returns the bytes.
/// The scratch file is gone by the time this resolves.
pub async fn render_export(
    layout: WorkbookSpec,
    scratch_dir: PathBuf,
    report: &'static str,
) -> AppResult<Vec<u8>> {
    tokio::task::spawn_blocking(move || {
        let file = ScratchFile::reserve(&scratch_dir, report)?;
        render(&layout, file.path())?;
        file.read()
    })
    .await
    .map_err(|error| {
        tracing::error!(report, error = %error, "Export render task failed");
        AppError::Render("Could not render export.".to_string())
    })?
}

fn window_rows(range: &DateRange, generated_at: DateTime<Utc>) -> Vec<(&'static str, Cell)> {
    let bound = |value: Option<DateTime<Utc>>| value.map_or(Cell::Text("All time".to_string()), Cell::Timestamp);
    vec![
        ("Generated At", Cell::Timestamp(generated_at)),
        ("Period Start", bound(range.start)),
        ("Period End", bound(range.end)),
    ]
}

fn transaction_summary_rows(label: &str, summary: &TransactionSummary) -> Vec<(String, Cell)> {
    vec![
        (format!("{label} Count"), Cell::Integer(summary.total_count as i64)),
        (format!("{label} Amount"), Cell::Money(summary.total_amount)),
        (format!("Average {label}"), Cell::Money(summary.average())),
        (format!("Approved {label} Count"), Cell::Integer(summary.approved.count as i64)),
        (format!("Approved {label} Amount"), Cell::Money(summary.approved.amount)),
        (format!("Pending {label} Count"), Cell::Integer(summary.pending.count as i64)),
        (format!("Pending {label} Amount"), Cell::Money(summary.pending.amount)),
        (format!("Rejected {label} Count"), Cell::Integer(summary.rejected.count as i64)),
        (format!("Rejected {label} Amount"), Cell::Money(summary.rejected.amount)),
        (format!("{label} Approval Rate"), Cell::Percent(summary.approval_rate)),
    ]
}

fn wallet_summary_rows(metrics: &WalletMetrics) -> Vec<(String, Cell)> {
    vec![
        ("Total Wallets".to_string(), Cell::Integer(metrics.total_wallets as i64)),
        ("Total Balance".to_string(), Cell::Money(metrics.total_balance)),
        ("Total NAV".to_string(), Cell::Money(metrics.total_nav)),
        ("Total Fees".to_string(), Cell::Money(metrics.total_fees)),
        ("Average Balance".to_string(), Cell::Money(metrics.average_balance)),
        ("Active Wallets".to_string(), Cell::Integer(metrics.active_wallets as i64)),
        ("Inactive Wallets".to_string(), Cell::Integer(metrics.inactive_wallets as i64)),
        ("Frozen Wallets".to_string(), Cell::Integer(metrics.frozen_wallets as i64)),
    ]
}

fn summary_layout(
    fixed: Vec<(&'static str, Cell)>,
    computed: &[(String, Cell)],
) -> WorkbookSpec {
    let mut rows: Vec<(&str, Cell)> = fixed;
    rows.extend(computed.iter().map(|(label, cell)| (label.as_str(), cell.clone())));
    WorkbookSpec::new(rows)
}

fn transaction_sheet(name: &str, records: &[Transaction]) -> Sheet {
    let columns = vec![
        column("ID", 38.0),
        column("User ID", 38.0),
        column("Amount", 16.0),
        column("Status", 14.0),
        column("Method", 18.0),
        column("Bank", 20.0),
        column("Reference", 22.0),
        column("Created At", 20.0),
    ];
    let rows = records
        .iter()
        .map(|record| {
            vec![
                Cell::Text(record.id.clone()),
                Cell::text(record.user_id.as_deref()),
                Cell::Money(record.amount),
                Cell::Status(record.status.as_str().to_string()),
                Cell::text(record.method.as_deref()),
                Cell::text(record.bank_name.as_deref()),
                Cell::text(record.reference.as_deref()),
                Cell::Timestamp(record.created_at),
            ]
        })
        .collect();
    Sheet::detail(name, columns, rows)
}

fn wallet_sheet(wallets: &[Wallet]) -> Sheet {
    let columns = vec![
        column("ID", 38.0),
        column("User ID", 38.0),
        column("Balance", 16.0),
        column("NAV", 16.0),
        column("Fees", 12.0),
        column("Currency", 10.0),
        column("Status", 12.0),
        column("Created At", 20.0),
    ];
    let rows = wallets
        .iter()
        .map(|wallet| {
            vec![
                Cell::Text(wallet.id.clone()),
                Cell::text(wallet.user_id.as_deref()),
                Cell::Money(wallet.balance),
                Cell::Money(wallet.nav),
                Cell::Money(wallet.fees),
                Cell::text(wallet.currency.as_deref()),
                Cell::Status(wallet.status.as_str().to_string()),
                Cell::Timestamp(wallet.created_at),
            ]
        })
        .collect();
    Sheet::detail("Wallets", columns, rows)
}

fn portfolio_sheet(portfolios: &[PortfolioRow]) -> Sheet {
    let columns = vec![
        column("ID", 38.0),
        column("User ID", 38.0),
        column("Name", 24.0),
        column("Assets", 10.0),
        column("Cost Basis", 16.0),
        column("Market Value", 16.0),
        column("Gain/Loss", 16.0),
        column("Created At", 20.0),
    ];
    let rows = portfolios
        .iter()
        .map(|portfolio| {
            vec![
                Cell::Text(portfolio.id.clone()),
                Cell::text(portfolio.user_id.as_deref()),
                Cell::text(portfolio.name.as_deref()),
                Cell::Integer(portfolio.asset_count as i64),
                Cell::Money(portfolio.cost_basis),
                Cell::Money(portfolio.market_value),
                Cell::Money(portfolio.gain_loss),
                Cell::Timestamp(portfolio.created_at),
            ]
        })
        .collect();
    Sheet::detail("Portfolios", columns, rows)
}

fn insights_sheet(insights: &[String]) -> Sheet {
    let rows = insights
        .iter()
        .enumerate()
        .map(|(index, insight)| vec![Cell::Integer(index as i64 + 1), Cell::Text(insight.clone())])
        .collect();
    Sheet::detail("Insights", vec![column("#", 6.0), column("Insight", 100.0)], rows)
}

pub fn transaction_export(
    kind: TransactionKind,
    summary: &TransactionSummary,
    records: &[Transaction],
    range: &DateRange,
    generated_at: DateTime<Utc>,
) -> WorkbookSpec {
    let (label, sheet_name) = match kind {
        TransactionKind::Deposit => ("Deposit", "Deposits"),
        TransactionKind::Withdrawal => ("Withdrawal", "Withdrawals"),
    };
    let mut fixed = vec![("Report", Cell::Text(format!("{sheet_name} Report")))];
    fixed.extend(window_rows(range, generated_at));
    summary_layout(fixed, &transaction_summary_rows(label, summary))
        .with_sheet(transaction_sheet(sheet_name, records))
}

pub fn wallet_export(
    metrics: &WalletMetrics,
    wallets: &[Wallet],
    generated_at: DateTime<Utc>,
) -> WorkbookSpec {
    let fixed = vec![
        ("Report", Cell::Text("Wallets Report".to_string())),
        ("Generated At", Cell::Timestamp(generated_at)),
    ];
    summary_layout(fixed, &wallet_summary_rows(metrics)).with_sheet(wallet_sheet(wallets))
}

pub fn comprehensive_export(
    summary: &SummaryReport,
    data: &ReportData,
    range: &DateRange,
    generated_at: DateTime<Utc>,
) -> WorkbookSpec {
    let mut fixed = vec![("Report", Cell::Text("Comprehensive Report".to_string()))];
    fixed.extend(window_rows(range, generated_at));

    let mut computed = transaction_summary_rows("Deposit", &summary.deposits);
    computed.extend(transaction_summary_rows("Withdrawal", &summary.withdrawals));
    computed.push(("Net Cash Flow".to_string(), Cell::Money(summary.net_cash_flow.amount)));
    computed.push((
        "Cash Flow Direction".to_string(),
        Cell::Text(
            match summary.net_cash_flow.status {
                CashFlowDirection::Positive => "POSITIVE",
                CashFlowDirection::Negative => "NEGATIVE",
            }
            .to_string(),
        ),
    ));
    computed.extend(wallet_summary_rows(&summary.wallets));
    computed.push(("Total Users".to_string(), Cell::Integer(summary.users.total_users as i64)));
    computed.push(("New Users".to_string(), Cell::Integer(summary.users.new_users as i64)));
    computed.push(("Pending Users".to_string(), Cell::Integer(summary.users.pending_users as i64)));
    computed.push((
        "Total Portfolios".to_string(),
        Cell::Integer(summary.portfolios.total_portfolios as i64),
    ));
    computed.push((
        "Portfolio Market Value".to_string(),
        Cell::Money(summary.portfolios.total_market_value),
    ));
    computed.push((
        "Portfolio Gain/Loss".to_string(),
        Cell::Money(summary.portfolios.total_gain_loss),
    ));
    if let Some(growth) = &summary.growth {
        for (label, value) in [
            ("Deposit Growth", growth.deposits),
            ("Withdrawal Growth", growth.withdrawals),
            ("New User Growth", growth.new_users),
        ] {
            computed.push((
                label.to_string(),
                value.map_or(Cell::Text("n/a".to_string()), Cell::Percent),
            ));
        }
    }

    let portfolios: Vec<PortfolioRow> = data.portfolios.iter().map(PortfolioRow::from).collect();
    summary_layout(fixed, &computed)
        .with_sheet(transaction_sheet("Deposits", &data.deposits))
        .with_sheet(transaction_sheet("Withdrawals", &data.withdrawals))
        .with_sheet(wallet_sheet(&data.wallets))
        .with_sheet(portfolio_sheet(&portfolios))
        .with_sheet(insights_sheet(&summary.insights))
}
