//! Query-string normalisation for the report endpoints.
//!
//! Every report handler receives the raw query as strings and turns it into a
//! [`ReportFilter`] here, so the aggregation layer only ever sees typed values.

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::models::{
    TransactionStatus, WalletStatus, ACTIVITY_MODULES, ACTIVITY_STATUSES, USER_ROLES,
    USER_STATUSES,
};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Calendar years a date bound may name.
pub const BOUND_YEARS: std::ops::RangeInclusive<i32> = 1900..=9999;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawReportQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub page: Option<String>,
    pub page_size: Option<String>,
    pub limit: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub period: Option<String>,
    pub status: Option<String>,
    pub role: Option<String>,
    pub user_status: Option<String>,
    pub module: Option<String>,
    pub action: Option<String>,
    pub user_id: Option<String>,
}

/// Closed-open `[start, end)` window. `None` means unbounded on that side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> AppResult<Self> {
        if let (Some(start), Some(end)) = (start, end) {
            if start >= end {
                return Err(AppError::BadRequest(
                    "startDate must be before endDate.".to_string(),
                ));
            }
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start.map_or(true, |start| instant >= start)
            && self.end.map_or(true, |end| instant < end)
    }

    /// The window of equal length ending where this one starts. Only defined
    /// when both bounds are present and the earlier start is representable.
    pub fn preceding(&self) -> Option<DateRange> {
        let (start, end) = (self.start?, self.end?);
        let previous_start = start.checked_sub_signed(end.signed_duration_since(start))?;
        Some(DateRange {
            start: Some(previous_start),
            end: Some(start),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Daily,
    Weekly,
    Monthly,
}

impl Period {
    fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim).unwrap_or_default().to_ascii_lowercase().as_str() {
            "weekly" | "week" => Self::Weekly,
            "monthly" | "month" => Self::Monthly,
            _ => Self::Daily,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Pagination {
    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1) as usize) * self.page_size as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Sort keys a report accepts, with the one used when the caller's key is unknown.
#[derive(Debug, Clone, Copy)]
pub struct SortKeys {
    pub allowed: &'static [&'static str],
    pub default: &'static str,
}

pub const TRANSACTION_SORT_KEYS: SortKeys = SortKeys {
    allowed: &["createdAt", "amount", "status", "method"],
    default: "createdAt",
};
pub const WALLET_SORT_KEYS: SortKeys = SortKeys {
    allowed: &["createdAt", "balance", "nav", "fees", "status"],
    default: "balance",
};
pub const PORTFOLIO_SORT_KEYS: SortKeys = SortKeys {
    allowed: &["createdAt", "marketValue", "gainLoss", "name"],
    default: "marketValue",
};
pub const USER_SORT_KEYS: SortKeys = SortKeys {
    allowed: &["createdAt", "email", "role", "status"],
    default: "createdAt",
};
pub const ACTIVITY_SORT_KEYS: SortKeys = SortKeys {
    allowed: &["createdAt", "action", "module", "status", "durationMs"],
    default: "createdAt",
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort {
    pub key: &'static str,
    pub order: SortOrder,
}

/// One recognised filter. Values that do not match a known member never make
/// it into a `Criterion`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Criterion {
    TransactionStatus(TransactionStatus),
    WalletStatus(WalletStatus),
    UserRole(&'static str),
    UserStatus(&'static str),
    ActivityModule(&'static str),
    ActivityStatus(&'static str),
    ActivityAction(String),
    UserId(String),
}

/// Which record set a criterion is being applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Deposits,
    Withdrawals,
    Wallets,
    Portfolios,
    Users,
    ActivityLogs,
}

impl Criterion {
    /// Column and value this criterion constrains on the given record set, or
    /// `None` when it does not apply there.
    pub fn column_for(&self, kind: RecordKind) -> Option<(&'static str, String)> {
        use RecordKind::*;
        match (self, kind) {
            (Self::TransactionStatus(status), Deposits | Withdrawals) => {
                Some(("status", status.as_str().to_string()))
            }
            (Self::WalletStatus(status), Wallets) => Some(("status", status.as_str().to_string())),
            (Self::UserRole(role), Users) => Some(("role", role.to_string())),
            (Self::UserStatus(status), Users) => Some(("status", status.to_string())),
            (Self::ActivityModule(module), ActivityLogs) => Some(("module", module.to_string())),
            (Self::ActivityStatus(status), ActivityLogs) => Some(("status", status.to_string())),
            (Self::ActivityAction(action), ActivityLogs) => Some(("action", action.clone())),
            (Self::UserId(user_id), Deposits | Withdrawals | Wallets | Portfolios | ActivityLogs) => {
                Some(("user_id", user_id.clone()))
            }
            (Self::UserId(user_id), Users) => Some(("id", user_id.clone())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportFilter {
    pub range: DateRange,
    pub pagination: Pagination,
    pub sort: Sort,
    pub period: Period,
    pub criteria: Vec<Criterion>,
}

impl ReportFilter {
    pub fn from_query(raw: &RawReportQuery, sort_keys: SortKeys) -> AppResult<Self> {
        let start = parse_bound(raw.start_date.as_deref(), "startDate", false)?;
        let end = parse_bound(raw.end_date.as_deref(), "endDate", true)?;
        let range = DateRange::new(start, end)?;

        let page = parse_number(raw.page.as_deref()).unwrap_or(1).max(1);
        let page_size = parse_number(raw.page_size.as_deref())
            .or_else(|| parse_number(raw.limit.as_deref()))
            .unwrap_or(i64::from(DEFAULT_PAGE_SIZE))
            .clamp(1, i64::from(MAX_PAGE_SIZE));

        Ok(Self {
            range,
            pagination: Pagination {
                page: u32::try_from(page).unwrap_or(u32::MAX),
                page_size: page_size as u32,
            },
            sort: parse_sort(raw, sort_keys),
            period: Period::parse(raw.period.as_deref()),
            criteria: parse_criteria(raw),
        })
    }

    /// Criteria that constrain the given record set, as column/value pairs.
    pub fn columns_for(&self, kind: RecordKind) -> Vec<(&'static str, String)> {
        self.criteria
            .iter()
            .filter_map(|criterion| criterion.column_for(kind))
            .collect()
    }

    /// Stable key identifying this filter for the response cache.
    pub fn cache_key(&self) -> String {
        let bound = |value: Option<DateTime<Utc>>| {
            value.map(|instant| instant.to_rfc3339()).unwrap_or_default()
        };
        format!(
            "{}|{}|{}|{}|{}|{:?}|{}|{:?}",
            bound(self.range.start),
            bound(self.range.end),
            self.pagination.page,
            self.pagination.page_size,
            self.sort.key,
            self.sort.order,
            self.period.as_str(),
            self.criteria,
        )
    }
}

fn parse_bound(
    raw: Option<&str>,
    field: &str,
    inclusive_day: bool,
) -> AppResult<Option<DateTime<Utc>>> {
    let Some(text) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(None);
    };

    if let Ok(instant) = DateTime::parse_from_rfc3339(text) {
        let instant = instant.with_timezone(&Utc);
        check_year(instant.year(), field)?;
        return Ok(Some(instant));
    }

    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map_err(|_| AppError::BadRequest(format!("Invalid {field}: expected YYYY-MM-DD.")))?;
    check_year(date.year(), field)?;
    // A date-only end bound covers the whole named day.
    let day = if inclusive_day {
        date.checked_add_days(Days::new(1))
            .ok_or_else(|| AppError::BadRequest(format!("Invalid {field}.")))?
    } else {
        date
    };
    Ok(Some(day.and_time(NaiveTime::MIN).and_utc()))
}

fn check_year(year: i32, field: &str) -> AppResult<()> {
    if BOUND_YEARS.contains(&year) {
        return Ok(());
    }
    Err(AppError::BadRequest(format!(
        "Invalid {field}: year must be between {} and {}.",
        BOUND_YEARS.start(),
        BOUND_YEARS.end()
    )))
}

fn parse_number(raw: Option<&str>) -> Option<i64> {
    raw.map(str::trim).and_then(|value| value.parse::<i64>().ok())
}

fn parse_sort(raw: &RawReportQuery, sort_keys: SortKeys) -> Sort {
    let requested = raw.sort_by.as_deref().map(str::trim).unwrap_or_default();
    let key = sort_keys
        .allowed
        .iter()
        .find(|candidate| candidate.eq_ignore_ascii_case(requested))
        .copied()
        .unwrap_or(sort_keys.default);
    let order = if raw
        .sort_order
        .as_deref()
        .is_some_and(|value| value.trim().eq_ignore_ascii_case("asc"))
    {
        SortOrder::Asc
    } else {
        SortOrder::Desc
    };
    Sort { key, order }
}

fn known_value(allowed: &'static [&'static str], raw: Option<&str>) -> Option<&'static str> {
    let value = raw.map(str::trim).filter(|value| !value.is_empty())?;
    allowed
        .iter()
        .find(|candidate| candidate.eq_ignore_ascii_case(value))
        .copied()
}

fn parse_criteria(raw: &RawReportQuery) -> Vec<Criterion> {
    let mut criteria = Vec::new();

    if let Some(status) = raw.status.as_deref() {
        // `status` is shared across reports; the record kind decides which reading applies.
        if let Some(parsed) = TransactionStatus::parse(status) {
            criteria.push(Criterion::TransactionStatus(parsed));
        }
        if let Some(parsed) = WalletStatus::parse(status) {
            criteria.push(Criterion::WalletStatus(parsed));
        }
        if let Some(parsed) = known_value(ACTIVITY_STATUSES, Some(status)) {
            criteria.push(Criterion::ActivityStatus(parsed));
        }
    }
    if let Some(role) = known_value(USER_ROLES, raw.role.as_deref()) {
        criteria.push(Criterion::UserRole(role));
    }
    if let Some(status) = known_value(USER_STATUSES, raw.user_status.as_deref()) {
        criteria.push(Criterion::UserStatus(status));
    }
    if let Some(module) = known_value(ACTIVITY_MODULES, raw.module.as_deref()) {
        criteria.push(Criterion::ActivityModule(module));
    }
    if let Some(action) = raw
        .action
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty() && value.len() <= 64)
    {
        criteria.push(Criterion::ActivityAction(action.to_ascii_uppercase()));
    }
    if let Some(user_id) = raw
        .user_id
        .as_deref()
        .and_then(|value| uuid::Uuid::parse_str(value.trim()).ok())
    {
        criteria.push(Criterion::UserId(user_id.to_string()));
    }

    criteria
}
