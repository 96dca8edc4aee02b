use chrono::{DateTime, Datelike, Months, NaiveDate, TimeZone, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    dto::admin::{
        DashboardOverview, OrderCounts, RecentOrder, RecentOrderList, RevenueSummary,
        SalesChart, StockBuckets,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::OrderStatus,
    response::{ApiResponse, Meta},
    routes::params::{RecentOrdersQuery, SalesChartQuery},
    state::AppState,
};

/// Products with this much stock or less count as "low" on the dashboard.
const LOW_STOCK_CEILING: i32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartPeriod {
    /// Last 7 days, one bucket per day.
    Days7,
    /// Last 4 weeks, one bucket per week.
    Days30,
    /// Last 3 calendar months, one bucket per month.
    Days90,
}

impl ChartPeriod {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "7" => Some(ChartPeriod::Days7),
            "30" => Some(ChartPeriod::Days30),
            "90" => Some(ChartPeriod::Days90),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChartPeriod::Days7 => "7",
            ChartPeriod::Days30 => "30",
            ChartPeriod::Days90 => "90",
        }
    }

    fn window_start(self, today: NaiveDate) -> NaiveDate {
        match self {
            ChartPeriod::Days7 => today - chrono::Days::new(6),
            ChartPeriod::Days30 => today - chrono::Days::new(27),
            ChartPeriod::Days90 => first_of_month(today)
                .checked_sub_months(Months::new(2))
                .unwrap_or(today),
        }
    }
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Fold realized orders into chart buckets. Pure so the windowing rules can
/// be tested without a database.
pub fn bucket_revenue(
    now: DateTime<Utc>,
    rows: &[(DateTime<Utc>, i64)],
    period: ChartPeriod,
) -> (Vec<String>, Vec<i64>) {
    let today = now.date_naive();
    let start = period.window_start(today);

    match period {
        ChartPeriod::Days7 => {
            let labels = (0..7)
                .map(|i| (start + chrono::Days::new(i)).format("%d/%m").to_string())
                .collect();
            let mut values = vec![0i64; 7];
            for (at, amount) in rows {
                let day = at.date_naive();
                if let Ok(idx) = usize::try_from((day - start).num_days()) {
                    if idx < 7 {
                        values[idx] += amount;
                    }
                }
            }
            (labels, values)
        }
        ChartPeriod::Days30 => {
            let labels = (1..=4).map(|i| format!("Week {i}")).collect();
            let mut values = vec![0i64; 4];
            for (at, amount) in rows {
                let day = at.date_naive();
                if let Ok(days) = usize::try_from((day - start).num_days()) {
                    let idx = days / 7;
                    if idx < 4 {
                        values[idx] += amount;
                    }
                }
            }
            (labels, values)
        }
        ChartPeriod::Days90 => {
            let months: Vec<NaiveDate> = (0..3)
                .map(|back| {
                    first_of_month(today)
                        .checked_sub_months(Months::new(2 - back))
                        .unwrap_or(today)
                })
                .collect();
            let labels = months.iter().map(|m| format!("Month {}", m.month())).collect();
            let mut values = vec![0i64; 3];
            for (at, amount) in rows {
                let day = at.date_naive();
                for (idx, month) in months.iter().enumerate() {
                    if day.year() == month.year() && day.month() == month.month() {
                        values[idx] += amount;
                    }
                }
            }
            (labels, values)
        }
    }
}

pub async fn dashboard_overview(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<DashboardOverview>> {
    ensure_admin(user)?;

    let (total, in_stock, low_stock, out_of_stock): (i64, i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT COUNT(*),
               COUNT(*) FILTER (WHERE stock > $1),
               COUNT(*) FILTER (WHERE stock BETWEEN 1 AND $1),
               COUNT(*) FILTER (WHERE stock = 0)
        FROM products
        WHERE is_active = TRUE
        "#,
    )
    .bind(LOW_STOCK_CEILING)
    .fetch_one(&state.pool)
    .await?;

    let (orders_total, pending, shipped, delivered, canceled): (i64, i64, i64, i64, i64) =
        sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE status = 'pending'),
                   COUNT(*) FILTER (WHERE status = 'shipped'),
                   COUNT(*) FILTER (WHERE status = 'delivered'),
                   COUNT(*) FILTER (WHERE status = 'canceled')
            FROM orders
            "#,
        )
        .fetch_one(&state.pool)
        .await?;

    let (today, this_month): (i64, i64) = sqlx::query_as(
        r#"
        SELECT COALESCE(SUM(total_amount) FILTER (WHERE created_at::date = CURRENT_DATE), 0)::bigint,
               COALESCE(SUM(total_amount) FILTER (WHERE created_at >= date_trunc('month', now())), 0)::bigint
        FROM orders
        WHERE status IN ('shipped', 'delivered')
        "#,
    )
    .fetch_one(&state.pool)
    .await?;

    let (customers,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM credentials WHERE role = 'customer'")
            .fetch_one(&state.pool)
            .await?;

    Ok(ApiResponse::success(
        "Overview",
        DashboardOverview {
            products: StockBuckets {
                total,
                in_stock,
                low_stock,
                out_of_stock,
            },
            orders: OrderCounts {
                total: orders_total,
                pending,
                shipped,
                delivered,
                canceled,
            },
            revenue: RevenueSummary { today, this_month },
            customers,
        },
        Some(Meta::empty()),
    ))
}

pub async fn sales_chart(
    state: &AppState,
    user: &AuthUser,
    query: SalesChartQuery,
) -> AppResult<ApiResponse<SalesChart>> {
    ensure_admin(user)?;

    let period = match query.period.as_deref() {
        None => ChartPeriod::Days7,
        Some(raw) => ChartPeriod::parse(raw)
            .ok_or_else(|| AppError::InvalidInput(format!("unknown period '{raw}'")))?,
    };

    let now = Utc::now();
    let start = period.window_start(now.date_naive());
    let start_at = Utc.from_utc_datetime(&start.and_time(chrono::NaiveTime::MIN));

    let rows: Vec<(DateTime<Utc>, i64)> = sqlx::query_as(
        r#"
        SELECT created_at, total_amount FROM orders
        WHERE status IN ('shipped', 'delivered') AND created_at >= $1
        "#,
    )
    .bind(start_at)
    .fetch_all(&state.pool)
    .await?;

    let (labels, values) = bucket_revenue(now, &rows, period);

    Ok(ApiResponse::success(
        "Sales chart",
        SalesChart {
            labels,
            values,
            period: period.as_str().to_string(),
        },
        Some(Meta::empty()),
    ))
}

pub async fn recent_orders(
    state: &AppState,
    user: &AuthUser,
    query: RecentOrdersQuery,
) -> AppResult<ApiResponse<RecentOrderList>> {
    ensure_admin(user)?;
    let limit = query.limit.unwrap_or(10).clamp(1, 50);

    #[derive(FromRow)]
    struct Row {
        id: Uuid,
        buyer_name: String,
        total_amount: i64,
        status: OrderStatus,
        created_at: DateTime<Utc>,
    }

    let rows: Vec<Row> = sqlx::query_as(
        r#"
        SELECT o.id, a.first_name || ' ' || a.last_name AS buyer_name,
               o.total_amount, o.status, o.created_at
        FROM orders o
        JOIN accounts a ON a.id = o.account_id
        ORDER BY o.created_at DESC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(&state.pool)
    .await?;

    let items = rows
        .into_iter()
        .map(|r| RecentOrder {
            id: r.id,
            buyer_name: r.buyer_name,
            total_amount: r.total_amount,
            status: r.status,
            created_at: r.created_at,
        })
        .collect();

    Ok(ApiResponse::success(
        "Recent orders",
        RecentOrderList { items },
        Some(Meta::empty()),
    ))
}
