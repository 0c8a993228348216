//! Builds the JSON report payloads from store reads.
//!
//! Each `*_report` function reads what it needs through [`ReportStore`], runs
//! the aggregation helpers and returns a serialisable value. A failed read
//! aborts the whole report; nothing partial is ever returned.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::models::{ActivityLog, Portfolio, PortfolioAsset, Transaction, TransactionStatus, User, Wallet, WalletStatus};
use crate::reports::aggregation::{
    average, count_by, count_series, from_cents, group_totals, growth_rate, period_key, round2,
    success_rate, time_series, to_cents, top_n, Bucket, CountBucket, PeriodBucket, PeriodCount, TOP_N,
};
use crate::reports::filters::{
    DateRange, Pagination, RecordKind, ReportFilter, Sort, SortOrder,
};
use crate::reports::store::{RecordQuery, ReportStore};

pub const RECENT_FAILURES: usize = 10;
pub const PENDING_USER_BACKLOG: u64 = 10;
pub const DEPOSIT_WITHDRAWAL_RATIO: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
}

impl TransactionKind {
    pub fn record_kind(self) -> RecordKind {
        match self {
            Self::Deposit => RecordKind::Deposits,
            Self::Withdrawal => RecordKind::Withdrawals,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Deposit => "deposits",
            Self::Withdrawal => "withdrawals",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StatusTotals {
    pub count: u64,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionSummary {
    pub total_count: u64,
    pub total_amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_deposit: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_withdrawal: Option<f64>,
    pub approved: StatusTotals,
    pub pending: StatusTotals,
    pub rejected: StatusTotals,
    pub approval_rate: f64,
}

impl TransactionSummary {
    pub fn build(kind: TransactionKind, records: &[Transaction]) -> Self {
        // (count, cents) per status: approved, pending, rejected
        let mut by_status = [(0_u64, 0_i64); 3];
        for record in records {
            let slot = match record.status {
                TransactionStatus::Approved => 0,
                TransactionStatus::Pending => 1,
                TransactionStatus::Rejected => 2,
            };
            by_status[slot].0 += 1;
            by_status[slot].1 += to_cents(record.amount);
        }
        let [approved, pending, rejected] = by_status.map(|(count, cents)| StatusTotals {
            count,
            amount: from_cents(cents),
        });

        let total_count = records.len() as u64;
        let total_amount = from_cents(by_status.iter().map(|(_, cents)| cents).sum());
        let mean = average(total_amount, records.len());
        Self {
            total_count,
            total_amount,
            average_deposit: (kind == TransactionKind::Deposit).then_some(mean),
            average_withdrawal: (kind == TransactionKind::Withdrawal).then_some(mean),
            approved,
            pending,
            rejected,
            approval_rate: success_rate(approved.count, total_count),
        }
    }

    pub fn average(&self) -> f64 {
        self.average_deposit
            .or(self.average_withdrawal)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    pub total_pages: u64,
}

impl<T> Page<T> {
    pub fn of(items: Vec<T>, pagination: Pagination) -> Self {
        let total = items.len() as u64;
        let page_size = u64::from(pagination.page_size.max(1));
        let items = items
            .into_iter()
            .skip(pagination.offset())
            .take(pagination.page_size as usize)
            .collect();
        Self {
            items,
            page: pagination.page,
            page_size: pagination.page_size,
            total,
            total_pages: total.div_ceil(page_size),
        }
    }
}

fn sort_by<T, F>(items: &mut [T], order: SortOrder, compare: F)
where
    F: Fn(&T, &T) -> Ordering,
{
    items.sort_by(|left, right| match order {
        SortOrder::Asc => compare(left, right),
        SortOrder::Desc => compare(right, left),
    });
}

fn cmp_f64(left: f64, right: f64) -> Ordering {
    left.partial_cmp(&right).unwrap_or(Ordering::Equal)
}

fn sort_transactions(records: &mut [Transaction], sort: Sort) {
    match sort.key {
        "amount" => sort_by(records, sort.order, |a, b| cmp_f64(a.amount, b.amount)),
        "status" => sort_by(records, sort.order, |a, b| a.status.as_str().cmp(b.status.as_str())),
        "method" => sort_by(records, sort.order, |a, b| a.method.cmp(&b.method)),
        _ => sort_by(records, sort.order, |a, b| a.created_at.cmp(&b.created_at)),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReport {
    pub summary: TransactionSummary,
    pub by_status: Vec<Bucket>,
    pub by_method: Vec<Bucket>,
    pub by_bank: Vec<Bucket>,
    pub period: &'static str,
    pub breakdown: Vec<PeriodBucket>,
    pub top_users: Vec<Bucket>,
    pub records: Page<Transaction>,
}

pub fn build_transaction_report(
    kind: TransactionKind,
    mut records: Vec<Transaction>,
    filter: &ReportFilter,
) -> TransactionReport {
    let summary = TransactionSummary::build(kind, &records);
    let by_status = group_totals(
        &records,
        |record| Some(record.status.as_str().to_string()),
        |record| record.amount,
    );
    let by_method = group_totals(&records, |record| record.method.clone(), |record| record.amount);
    let by_bank = group_totals(&records, |record| record.bank_name.clone(), |record| record.amount);
    let breakdown = time_series(&records, filter.period, |record| record.created_at, |record| record.amount);
    let top_users = top_n(
        group_totals(&records, |record| record.user_id.clone(), |record| record.amount),
        |bucket| bucket.amount,
        TOP_N,
    );

    sort_transactions(&mut records, filter.sort);
    TransactionReport {
        summary,
        by_status,
        by_method,
        by_bank,
        period: filter.period.as_str(),
        breakdown,
        top_users,
        records: Page::of(records, filter.pagination),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletMetrics {
    pub total_wallets: u64,
    pub total_balance: f64,
    pub total_nav: f64,
    pub total_fees: f64,
    pub average_balance: f64,
    pub active_wallets: u64,
    pub inactive_wallets: u64,
    pub frozen_wallets: u64,
}

impl WalletMetrics {
    pub fn build(wallets: &[Wallet]) -> Self {
        let total_balance: f64 = wallets.iter().map(|wallet| wallet.balance).sum();
        let count_status = |status: WalletStatus| {
            wallets.iter().filter(|wallet| wallet.status == status).count() as u64
        };
        Self {
            total_wallets: wallets.len() as u64,
            total_balance: round2(total_balance),
            total_nav: round2(wallets.iter().map(|wallet| wallet.nav).sum()),
            total_fees: round2(wallets.iter().map(|wallet| wallet.fees).sum()),
            average_balance: average(total_balance, wallets.len()),
            active_wallets: count_status(WalletStatus::Active),
            inactive_wallets: count_status(WalletStatus::Inactive),
            frozen_wallets: count_status(WalletStatus::Frozen),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WalletStatusTotals {
    pub status: &'static str,
    pub count: u64,
    pub balance: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletReport {
    pub summary: WalletMetrics,
    pub by_status: Vec<WalletStatusTotals>,
    pub by_currency: Vec<Bucket>,
    pub top_wallets: Vec<Wallet>,
    pub records: Page<Wallet>,
}

pub fn build_wallet_report(mut wallets: Vec<Wallet>, filter: &ReportFilter) -> WalletReport {
    let summary = WalletMetrics::build(&wallets);
    let by_status = WalletStatus::ALL
        .into_iter()
        .map(|status| {
            let matching = wallets.iter().filter(|wallet| wallet.status == status);
            let (count, balance) =
                matching.fold((0_u64, 0.0), |(count, balance), wallet| (count + 1, balance + wallet.balance));
            WalletStatusTotals {
                status: status.as_str(),
                count,
                balance: round2(balance),
            }
        })
        .collect();
    let by_currency = group_totals(&wallets, |wallet| wallet.currency.clone(), |wallet| wallet.balance);
    let top_wallets = top_n(wallets.clone(), |wallet| wallet.balance, TOP_N);

    match filter.sort.key {
        "createdAt" => sort_by(&mut wallets, filter.sort.order, |a, b| a.created_at.cmp(&b.created_at)),
        "nav" => sort_by(&mut wallets, filter.sort.order, |a, b| cmp_f64(a.nav, b.nav)),
        "fees" => sort_by(&mut wallets, filter.sort.order, |a, b| cmp_f64(a.fees, b.fees)),
        "status" => sort_by(&mut wallets, filter.sort.order, |a, b| {
            a.status.as_str().cmp(b.status.as_str())
        }),
        _ => sort_by(&mut wallets, filter.sort.order, |a, b| cmp_f64(a.balance, b.balance)),
    }

    WalletReport {
        summary,
        by_status,
        by_currency,
        top_wallets,
        records: Page::of(wallets, filter.pagination),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioMetrics {
    pub total_portfolios: u64,
    pub total_assets: u64,
    pub total_cost_basis: f64,
    pub total_market_value: f64,
    pub total_gain_loss: f64,
    pub gain_loss_percent: Option<f64>,
}

impl PortfolioMetrics {
    pub fn build(portfolios: &[Portfolio]) -> Self {
        let cost_basis: f64 = portfolios.iter().map(Portfolio::cost_basis).sum();
        let gain_loss: f64 = portfolios.iter().map(Portfolio::gain_loss).sum();
        Self {
            total_portfolios: portfolios.len() as u64,
            total_assets: portfolios.iter().map(|portfolio| portfolio.assets.len() as u64).sum(),
            total_cost_basis: round2(cost_basis),
            total_market_value: round2(portfolios.iter().map(Portfolio::market_value).sum()),
            total_gain_loss: round2(gain_loss),
            gain_loss_percent: (cost_basis != 0.0).then(|| round2(gain_loss / cost_basis * 100.0)),
        }
    }
}

/// A portfolio flattened with its computed valuation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioRow {
    pub id: String,
    pub user_id: Option<String>,
    pub name: Option<String>,
    pub status: Option<String>,
    pub asset_count: u64,
    pub cost_basis: f64,
    pub market_value: f64,
    pub gain_loss: f64,
    pub created_at: DateTime<Utc>,
}

impl From<&Portfolio> for PortfolioRow {
    fn from(portfolio: &Portfolio) -> Self {
        Self {
            id: portfolio.id.clone(),
            user_id: portfolio.user_id.clone(),
            name: portfolio.name.clone(),
            status: portfolio.status.clone(),
            asset_count: portfolio.assets.len() as u64,
            cost_basis: round2(portfolio.cost_basis()),
            market_value: round2(portfolio.market_value()),
            gain_loss: round2(portfolio.gain_loss()),
            created_at: portfolio.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRow {
    pub id: String,
    pub portfolio_id: String,
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub sector: Option<String>,
    pub quantity: f64,
    pub cost_price: f64,
    pub close_value: f64,
    pub market_value: f64,
    pub gain_loss: f64,
}

impl From<&PortfolioAsset> for AssetRow {
    fn from(asset: &PortfolioAsset) -> Self {
        Self {
            id: asset.id.clone(),
            portfolio_id: asset.portfolio_id.clone(),
            symbol: asset.symbol.clone(),
            name: asset.name.clone(),
            sector: asset.sector.clone(),
            quantity: asset.quantity,
            cost_price: asset.cost_price,
            close_value: asset.close_value,
            market_value: round2(asset.market_value()),
            gain_loss: round2(asset.gain_loss()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioReport {
    pub summary: PortfolioMetrics,
    pub by_sector: Vec<Bucket>,
    pub top_portfolios: Vec<PortfolioRow>,
    pub top_assets: Vec<AssetRow>,
    pub records: Page<PortfolioRow>,
}

pub fn build_portfolio_report(portfolios: &[Portfolio], filter: &ReportFilter) -> PortfolioReport {
    let assets: Vec<&PortfolioAsset> = portfolios.iter().flat_map(|portfolio| &portfolio.assets).collect();
    let by_sector = group_totals(&assets, |asset| asset.sector.clone(), |asset| asset.market_value());
    let top_assets = top_n(
        assets.iter().map(|asset| AssetRow::from(*asset)).collect::<Vec<_>>(),
        |row| row.gain_loss,
        TOP_N,
    );

    let mut rows: Vec<PortfolioRow> = portfolios.iter().map(PortfolioRow::from).collect();
    let top_portfolios = top_n(rows.clone(), |row| row.market_value, TOP_N);
    match filter.sort.key {
        "createdAt" => sort_by(&mut rows, filter.sort.order, |a, b| a.created_at.cmp(&b.created_at)),
        "gainLoss" => sort_by(&mut rows, filter.sort.order, |a, b| cmp_f64(a.gain_loss, b.gain_loss)),
        "name" => sort_by(&mut rows, filter.sort.order, |a, b| a.name.cmp(&b.name)),
        _ => sort_by(&mut rows, filter.sort.order, |a, b| cmp_f64(a.market_value, b.market_value)),
    }

    PortfolioReport {
        summary: PortfolioMetrics::build(portfolios),
        by_sector,
        top_portfolios,
        top_assets,
        records: Page::of(rows, filter.pagination),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMetrics {
    pub total_users: u64,
    pub new_users: u64,
    pub pending_users: u64,
    pub by_status: Vec<CountBucket>,
    pub by_role: Vec<CountBucket>,
    pub by_kyc_status: Vec<CountBucket>,
}

impl UserMetrics {
    /// `users` is the full population; `range` selects who counts as new.
    pub fn build(users: &[User], range: &DateRange) -> Self {
        let status_is = |user: &User, expected: &str| {
            user.status
                .as_deref()
                .is_some_and(|status| status.eq_ignore_ascii_case(expected))
        };
        Self {
            total_users: users.len() as u64,
            new_users: users.iter().filter(|user| range.contains(user.created_at)).count() as u64,
            pending_users: users.iter().filter(|user| status_is(user, "PENDING")).count() as u64,
            by_status: count_by(users, |user| user.status.clone()),
            by_role: count_by(users, |user| user.role.clone()),
            by_kyc_status: count_by(users, |user| user.kyc_status.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserReport {
    pub summary: UserMetrics,
    pub period: &'static str,
    pub registrations: Vec<PeriodCount>,
    pub records: Page<User>,
}

pub fn build_user_report(mut users: Vec<User>, filter: &ReportFilter) -> UserReport {
    let summary = UserMetrics::build(&users, &filter.range);
    let joined: Vec<&User> = users
        .iter()
        .filter(|user| filter.range.contains(user.created_at))
        .collect();
    let registrations = count_series(&joined, filter.period, |user| user.created_at);

    match filter.sort.key {
        "email" => sort_by(&mut users, filter.sort.order, |a, b| a.email.cmp(&b.email)),
        "role" => sort_by(&mut users, filter.sort.order, |a, b| a.role.cmp(&b.role)),
        "status" => sort_by(&mut users, filter.sort.order, |a, b| a.status.cmp(&b.status)),
        _ => sort_by(&mut users, filter.sort.order, |a, b| a.created_at.cmp(&b.created_at)),
    }

    UserReport {
        summary,
        period: filter.period.as_str(),
        registrations,
        records: Page::of(users, filter.pagination),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityMetrics {
    pub total_activities: u64,
    pub successful: u64,
    pub failed: u64,
    pub success_rate: f64,
    pub failure_rate: f64,
    pub average_duration_ms: f64,
}

impl ActivityMetrics {
    pub fn build(logs: &[ActivityLog]) -> Self {
        let total = logs.len() as u64;
        let successful = logs.iter().filter(|log| log.is_success()).count() as u64;
        let failed = logs.iter().filter(|log| log.is_failure()).count() as u64;
        let success = success_rate(successful, total);
        // Rounded separately the two rates could overshoot 100 by a cent.
        let failure = success_rate(failed, total).min(round2(100.0 - success));

        let durations: Vec<i64> = logs.iter().filter_map(|log| log.duration_ms).collect();
        Self {
            total_activities: total,
            successful,
            failed,
            success_rate: success,
            failure_rate: failure,
            average_duration_ms: average(durations.iter().sum::<i64>() as f64, durations.len()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityReport {
    pub summary: ActivityMetrics,
    pub by_module: Vec<CountBucket>,
    pub by_action: Vec<CountBucket>,
    pub by_status: Vec<CountBucket>,
    pub period: &'static str,
    pub timeline: Vec<PeriodCount>,
    pub top_users: Vec<CountBucket>,
    pub recent_failures: Vec<ActivityLog>,
    pub records: Page<ActivityLog>,
}

pub fn build_activity_report(logs: Vec<ActivityLog>, filter: &ReportFilter) -> ActivityReport {
    let mut latest_first = logs.clone();
    latest_first.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let recent_failures = latest_first
        .into_iter()
        .filter(ActivityLog::is_failure)
        .take(RECENT_FAILURES)
        .collect();

    let top_users = top_n(
        count_by(&logs, |log| log.user_id.clone()),
        |bucket| bucket.count as f64,
        TOP_N,
    );

    let summary = ActivityMetrics::build(&logs);
    let by_module = count_by(&logs, |log| log.module.clone());
    let by_action = count_by(&logs, |log| Some(log.action.clone()));
    let by_status = count_by(&logs, |log| log.status.clone());
    let timeline = count_series(&logs, filter.period, |log| log.created_at);

    ActivityReport {
        summary,
        by_module,
        by_action,
        by_status,
        period: filter.period.as_str(),
        timeline,
        top_users,
        recent_failures,
        records: activity_page(logs, filter),
    }
}

/// One sorted page of audit records.
pub fn activity_page(mut logs: Vec<ActivityLog>, filter: &ReportFilter) -> Page<ActivityLog> {
    match filter.sort.key {
        "action" => sort_by(&mut logs, filter.sort.order, |a, b| a.action.cmp(&b.action)),
        "module" => sort_by(&mut logs, filter.sort.order, |a, b| a.module.cmp(&b.module)),
        "status" => sort_by(&mut logs, filter.sort.order, |a, b| a.status.cmp(&b.status)),
        "durationMs" => sort_by(&mut logs, filter.sort.order, |a, b| a.duration_ms.cmp(&b.duration_ms)),
        _ => sort_by(&mut logs, filter.sort.order, |a, b| a.created_at.cmp(&b.created_at)),
    }
    Page::of(logs, filter.pagination)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CashFlowDirection {
    Positive,
    Negative,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NetCashFlow {
    pub amount: f64,
    pub status: CashFlowDirection,
}

impl NetCashFlow {
    pub fn between(deposits: &TransactionSummary, withdrawals: &TransactionSummary) -> Self {
        let amount = round2(deposits.approved.amount - withdrawals.approved.amount);
        Self {
            amount,
            status: if amount >= 0.0 {
                CashFlowDirection::Positive
            } else {
                CashFlowDirection::Negative
            },
        }
    }
}

/// Percentage change against the preceding window; `None` members mean the
/// previous value was zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Growth {
    pub deposits: Option<f64>,
    pub withdrawals: Option<f64>,
    pub new_users: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportWindow {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl From<DateRange> for ReportWindow {
    fn from(range: DateRange) -> Self {
        Self {
            start_date: range.start,
            end_date: range.end,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryReport {
    pub window: ReportWindow,
    pub deposits: TransactionSummary,
    pub withdrawals: TransactionSummary,
    pub net_cash_flow: NetCashFlow,
    pub wallets: WalletMetrics,
    pub users: UserMetrics,
    pub portfolios: PortfolioMetrics,
    pub growth: Option<Growth>,
    pub insights: Vec<String>,
}

/// Everything the comprehensive summary and its export read, fetched together.
#[derive(Debug, Clone, Default)]
pub struct ReportData {
    pub deposits: Vec<Transaction>,
    pub withdrawals: Vec<Transaction>,
    pub wallets: Vec<Wallet>,
    pub portfolios: Vec<Portfolio>,
    pub users: Vec<User>,
    pub previous_deposits: Vec<Transaction>,
    pub previous_withdrawals: Vec<Transaction>,
}

pub fn build_summary_report(data: &ReportData, filter: &ReportFilter) -> SummaryReport {
    let deposits = TransactionSummary::build(TransactionKind::Deposit, &data.deposits);
    let withdrawals = TransactionSummary::build(TransactionKind::Withdrawal, &data.withdrawals);
    let net_cash_flow = NetCashFlow::between(&deposits, &withdrawals);
    let wallets = WalletMetrics::build(&data.wallets);
    let users = UserMetrics::build(&data.users, &filter.range);
    let portfolios = PortfolioMetrics::build(&data.portfolios);

    let growth = filter.range.preceding().map(|previous| {
        let total = |records: &[Transaction]| records.iter().map(|record| record.amount).sum::<f64>();
        let previous_new_users = data
            .users
            .iter()
            .filter(|user| previous.contains(user.created_at))
            .count();
        Growth {
            deposits: growth_rate(deposits.total_amount, total(&data.previous_deposits)),
            withdrawals: growth_rate(withdrawals.total_amount, total(&data.previous_withdrawals)),
            new_users: growth_rate(users.new_users as f64, previous_new_users as f64),
        }
    });

    let insights = insights(&deposits, &withdrawals, &net_cash_flow, &users, &wallets);
    SummaryReport {
        window: filter.range.into(),
        deposits,
        withdrawals,
        net_cash_flow,
        wallets,
        users,
        portfolios,
        growth,
        insights,
    }
}

/// Advisory observations over the computed metrics.
pub fn insights(
    deposits: &TransactionSummary,
    withdrawals: &TransactionSummary,
    net_cash_flow: &NetCashFlow,
    users: &UserMetrics,
    wallets: &WalletMetrics,
) -> Vec<String> {
    let mut notes = Vec::new();

    match net_cash_flow.status {
        CashFlowDirection::Positive => notes.push(format!(
            "Positive net cash flow of {:.2}: approved deposits exceed approved withdrawals.",
            net_cash_flow.amount
        )),
        CashFlowDirection::Negative => notes.push(format!(
            "Negative net cash flow of {:.2}: approved withdrawals exceed approved deposits.",
            net_cash_flow.amount.abs()
        )),
    }

    if users.pending_users > PENDING_USER_BACKLOG {
        notes.push(format!(
            "{} users are pending approval. Consider reviewing the onboarding queue.",
            users.pending_users
        ));
    }

    if withdrawals.total_amount > 0.0 {
        let ratio = deposits.total_amount / withdrawals.total_amount;
        if ratio > DEPOSIT_WITHDRAWAL_RATIO {
            notes.push(format!(
                "Deposits are {ratio:.2}x withdrawals for the period, indicating strong inflows."
            ));
        }
    }

    if deposits.pending.count > 0 {
        notes.push(format!(
            "{} deposits totalling {:.2} are awaiting review.",
            deposits.pending.count, deposits.pending.amount
        ));
    }

    if wallets.frozen_wallets > 0 {
        notes.push(format!("{} wallets are currently frozen.", wallets.frozen_wallets));
    }

    notes
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendTotals {
    pub count: u64,
    pub amount: f64,
    pub approved_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendBucket {
    pub period: String,
    pub deposits: TrendTotals,
    pub withdrawals: TrendTotals,
    pub net_flow: f64,
    pub new_users: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrendsReport {
    pub period: &'static str,
    pub buckets: Vec<TrendBucket>,
}

pub fn build_trends_report(
    deposits: &[Transaction],
    withdrawals: &[Transaction],
    users: &[User],
    filter: &ReportFilter,
) -> TrendsReport {
    #[derive(Default)]
    struct Acc {
        deposits: TrendTotals,
        withdrawals: TrendTotals,
        new_users: u64,
    }

    fn add(totals: &mut TrendTotals, record: &Transaction) {
        totals.count += 1;
        totals.amount += record.amount;
        if record.is_approved() {
            totals.approved_amount += record.amount;
        }
    }

    let mut buckets: BTreeMap<String, Acc> = BTreeMap::new();
    for record in deposits {
        add(
            &mut buckets.entry(period_key(record.created_at, filter.period)).or_default().deposits,
            record,
        );
    }
    for record in withdrawals {
        add(
            &mut buckets.entry(period_key(record.created_at, filter.period)).or_default().withdrawals,
            record,
        );
    }
    for user in users.iter().filter(|user| filter.range.contains(user.created_at)) {
        buckets
            .entry(period_key(user.created_at, filter.period))
            .or_default()
            .new_users += 1;
    }

    let round = |totals: TrendTotals| TrendTotals {
        count: totals.count,
        amount: round2(totals.amount),
        approved_amount: round2(totals.approved_amount),
    };
    TrendsReport {
        period: filter.period.as_str(),
        buckets: buckets
            .into_iter()
            .map(|(period, acc)| TrendBucket {
                period,
                net_flow: round2(acc.deposits.approved_amount - acc.withdrawals.approved_amount),
                deposits: round(acc.deposits),
                withdrawals: round(acc.withdrawals),
                new_users: acc.new_users,
            })
            .collect(),
    }
}

/// Logs the underlying failure and replaces it with the generic report error.
pub(crate) fn generation_failed(report: &'static str) -> impl Fn(AppError) -> AppError {
    move |error| {
        tracing::error!(report, error = %error, "Report data read failed");
        AppError::ReportGeneration(format!("Could not generate {report} report."))
    }
}

pub async fn transaction_report(
    store: &dyn ReportStore,
    kind: TransactionKind,
    filter: &ReportFilter,
) -> AppResult<TransactionReport> {
    let query = RecordQuery::window(filter, kind.record_kind(), None);
    let records = match kind {
        TransactionKind::Deposit => store.deposits(&query).await,
        TransactionKind::Withdrawal => store.withdrawals(&query).await,
    }
    .map_err(generation_failed(kind.label()))?;
    Ok(build_transaction_report(kind, records, filter))
}

pub async fn wallet_report(store: &dyn ReportStore, filter: &ReportFilter) -> AppResult<WalletReport> {
    let wallets = store
        .wallets(&RecordQuery::window(filter, RecordKind::Wallets, None))
        .await
        .map_err(generation_failed("wallets"))?;
    Ok(build_wallet_report(wallets, filter))
}

pub async fn portfolio_report(store: &dyn ReportStore, filter: &ReportFilter) -> AppResult<PortfolioReport> {
    let portfolios = store
        .portfolios(&RecordQuery::window(filter, RecordKind::Portfolios, None))
        .await
        .map_err(generation_failed("portfolios"))?;
    Ok(build_portfolio_report(&portfolios, filter))
}

pub async fn user_report(store: &dyn ReportStore, filter: &ReportFilter) -> AppResult<UserReport> {
    let users = store
        .users(&RecordQuery::snapshot(filter, RecordKind::Users, None))
        .await
        .map_err(generation_failed("users"))?;
    Ok(build_user_report(users, filter))
}

pub async fn activity_report(store: &dyn ReportStore, filter: &ReportFilter) -> AppResult<ActivityReport> {
    let logs = store
        .activity_logs(&RecordQuery::window(filter, RecordKind::ActivityLogs, None))
        .await
        .map_err(generation_failed("activity"))?;
    Ok(build_activity_report(logs, filter))
}

/// Reads every record set the summary needs concurrently. `limit` caps each
/// set; `None` reads every matching record.
pub async fn load_report_data(
    store: &dyn ReportStore,
    filter: &ReportFilter,
    limit: Option<usize>,
) -> AppResult<ReportData> {
    let deposits_query = RecordQuery::window(filter, RecordKind::Deposits, limit);
    let withdrawals_query = RecordQuery::window(filter, RecordKind::Withdrawals, limit);
    let wallets_query = RecordQuery::snapshot(filter, RecordKind::Wallets, limit);
    let portfolios_query = RecordQuery::snapshot(filter, RecordKind::Portfolios, limit);
    let users_query = RecordQuery::snapshot(filter, RecordKind::Users, limit);
    let previous = filter.range.preceding();

    let previous_deposits = async {
        match previous {
            Some(range) => {
                store
                    .deposits(&RecordQuery::within(filter, RecordKind::Deposits, range, limit))
                    .await
            }
            None => Ok(Vec::new()),
        }
    };
    let previous_withdrawals = async {
        match previous {
            Some(range) => {
                store
                    .withdrawals(&RecordQuery::within(filter, RecordKind::Withdrawals, range, limit))
                    .await
            }
            None => Ok(Vec::new()),
        }
    };

    let (deposits, withdrawals, wallets, portfolios, users, previous_deposits, previous_withdrawals) =
        tokio::try_join!(
            store.deposits(&deposits_query),
            store.withdrawals(&withdrawals_query),
            store.wallets(&wallets_query),
            store.portfolios(&portfolios_query),
            store.users(&users_query),
            previous_deposits,
            previous_withdrawals,
        )
        .map_err(generation_failed("summary"))?;

    Ok(ReportData {
        deposits,
        withdrawals,
        wallets,
        portfolios,
        users,
        previous_deposits,
        previous_withdrawals,
    })
}

pub async fn summary_report(store: &dyn ReportStore, filter: &ReportFilter) -> AppResult<SummaryReport> {
    let data = load_report_data(store, filter, None).await?;
    Ok(build_summary_report(&data, filter))
}

pub async fn trends_report(store: &dyn ReportStore, filter: &ReportFilter) -> AppResult<TrendsReport> {
    let deposits_query = RecordQuery::window(filter, RecordKind::Deposits, None);
    let withdrawals_query = RecordQuery::window(filter, RecordKind::Withdrawals, None);
    let users_query = RecordQuery::window(filter, RecordKind::Users, None);
    let (deposits, withdrawals, users) = tokio::try_join!(
        store.deposits(&deposits_query),
        store.withdrawals(&withdrawals_query),
        store.users(&users_query),
    )
    .map_err(generation_failed("trends"))?;
    Ok(build_trends_report(&deposits, &withdrawals, &users, filter))
}
