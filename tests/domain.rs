use chrono::{TimeZone, Utc};

use petshop_api::models::OrderStatus;
use petshop_api::routes::params::Pagination;
use petshop_api::services::catalog_service::resolve_image_url;
use petshop_api::services::report_service::{ChartPeriod, bucket_revenue};

#[test]
fn order_status_transitions() {
    use OrderStatus::*;

    assert!(Pending.can_transition(Shipped));
    assert!(Pending.can_transition(Canceled));
    assert!(Shipped.can_transition(Delivered));

    // Everything else is rejected, including the canceled -> delivered jump
    // and self-transitions.
    for from in [Pending, Shipped, Delivered, Canceled] {
        for to in [Pending, Shipped, Delivered, Canceled] {
            let allowed = matches!(
                (from, to),
                (Pending, Shipped) | (Pending, Canceled) | (Shipped, Delivered)
            );
            assert_eq!(from.can_transition(to), allowed, "{from} -> {to}");
        }
    }
}

#[test]
fn order_status_round_trips_through_strings() {
    for status in [
        OrderStatus::Pending,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Canceled,
    ] {
        assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
    }
    assert_eq!(OrderStatus::parse("paid"), None);
}

#[test]
fn pagination_clamps_inputs() {
    let p = Pagination {
        page: None,
        per_page: None,
    };
    assert_eq!(p.normalize(), (1, 20, 0));

    let p = Pagination {
        page: Some(0),
        per_page: Some(0),
    };
    assert_eq!(p.normalize(), (1, 1, 0));

    let p = Pagination {
        page: Some(3),
        per_page: Some(500),
    };
    assert_eq!(p.normalize(), (3, 100, 200));
}

#[test]
fn image_urls_resolve_against_media_base() {
    let base = "https://media.test/petshop/";
    assert_eq!(resolve_image_url(base, None), None);
    assert_eq!(
        resolve_image_url(base, Some("kibble.jpg")),
        Some("https://media.test/petshop/kibble.jpg".to_string())
    );
    // Absolute references pass through untouched.
    assert_eq!(
        resolve_image_url(base, Some("https://cdn.example.com/x.png")),
        Some("https://cdn.example.com/x.png".to_string())
    );
}

#[test]
fn chart_period_parses_known_windows() {
    assert_eq!(ChartPeriod::parse("7"), Some(ChartPeriod::Days7));
    assert_eq!(ChartPeriod::parse("30"), Some(ChartPeriod::Days30));
    assert_eq!(ChartPeriod::parse("90"), Some(ChartPeriod::Days90));
    assert_eq!(ChartPeriod::parse("365"), None);
}

#[test]
fn daily_buckets_cover_the_last_week() {
    let now = Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap();
    let rows = vec![
        (Utc.with_ymd_and_hms(2026, 3, 15, 8, 0, 0).unwrap(), 100),
        (Utc.with_ymd_and_hms(2026, 3, 15, 20, 0, 0).unwrap(), 50),
        (Utc.with_ymd_and_hms(2026, 3, 9, 9, 0, 0).unwrap(), 30),
        // Outside the window, must be dropped.
        (Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(), 999),
    ];

    let (labels, values) = bucket_revenue(now, &rows, ChartPeriod::Days7);
    assert_eq!(labels.len(), 7);
    assert_eq!(labels[0], "09/03");
    assert_eq!(labels[6], "15/03");
    assert_eq!(values, vec![30, 0, 0, 0, 0, 0, 150]);
}

#[test]
fn weekly_buckets_split_the_last_month() {
    let now = Utc.with_ymd_and_hms(2026, 3, 28, 12, 0, 0).unwrap();
    // Window starts 2026-03-01 (27 days back).
    let rows = vec![
        (Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap(), 10),
        (Utc.with_ymd_and_hms(2026, 3, 10, 0, 0, 0).unwrap(), 20),
        (Utc.with_ymd_and_hms(2026, 3, 27, 0, 0, 0).unwrap(), 40),
    ];

    let (labels, values) = bucket_revenue(now, &rows, ChartPeriod::Days30);
    assert_eq!(labels, vec!["Week 1", "Week 2", "Week 3", "Week 4"]);
    assert_eq!(values, vec![10, 20, 0, 40]);
}

#[test]
fn monthly_buckets_follow_calendar_months() {
    let now = Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap();
    let rows = vec![
        (Utc.with_ymd_and_hms(2026, 1, 20, 0, 0, 0).unwrap(), 5),
        (Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap(), 7),
        (Utc.with_ymd_and_hms(2026, 3, 14, 0, 0, 0).unwrap(), 11),
    ];

    let (labels, values) = bucket_revenue(now, &rows, ChartPeriod::Days90);
    assert_eq!(labels, vec!["Month 1", "Month 2", "Month 3"]);
    assert_eq!(values, vec![5, 7, 11]);
}

#[test]
fn monthly_buckets_wrap_across_new_year() {
    let now = Utc.with_ymd_and_hms(2026, 1, 10, 12, 0, 0).unwrap();
    let rows = vec![
        (Utc.with_ymd_and_hms(2025, 11, 20, 0, 0, 0).unwrap(), 3),
        (Utc.with_ymd_and_hms(2025, 12, 24, 0, 0, 0).unwrap(), 4),
        (Utc.with_ymd_and_hms(2026, 1, 5, 0, 0, 0).unwrap(), 8),
    ];

    let (labels, values) = bucket_revenue(now, &rows, ChartPeriod::Days90);
    assert_eq!(labels, vec!["Month 11", "Month 12", "Month 1"]);
    assert_eq!(values, vec![3, 4, 8]);
}
