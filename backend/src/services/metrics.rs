use lazy_static::lazy_static;
use prometheus::{
    register_gauge, register_gauge_vec, register_int_counter, register_int_counter_vec, Gauge,
    GaugeVec, IntCounter, IntCounterVec,
};
use sqlx::PgPool;
use tracing::{info, warn};

lazy_static! {
    // ── Event counters ──────────────────────────────────────────────────────
    pub static ref REQUESTS_CREATED: IntCounterVec = register_int_counter_vec!(
        "nitoagua_requests_created_total",
        "Water requests created, by requester kind",
        &["kind"]
    ).unwrap();

    pub static ref OFFERS_CREATED: IntCounter = register_int_counter!(
        "nitoagua_offers_created_total",
        "Offers submitted by suppliers"
    ).unwrap();

    pub static ref OFFERS_ACCEPTED: IntCounter = register_int_counter!(
        "nitoagua_offers_accepted_total",
        "Offers accepted by consumers"
    ).unwrap();

    pub static ref OFFERS_EXPIRED: IntCounter = register_int_counter!(
        "nitoagua_offers_expired_total",
        "Offers expired by the sweep"
    ).unwrap();

    pub static ref DELIVERIES_COMPLETED: IntCounter = register_int_counter!(
        "nitoagua_deliveries_completed_total",
        "Deliveries marked complete by suppliers"
    ).unwrap();

    pub static ref DISPUTES_OPENED: IntCounter = register_int_counter!(
        "nitoagua_disputes_opened_total",
        "Disputes filed by consumers"
    ).unwrap();

    pub static ref NOTIFICATIONS_SENT: IntCounterVec = register_int_counter_vec!(
        "nitoagua_notifications_total",
        "Notifications by channel and outcome",
        &["channel", "status"]
    ).unwrap();

    // ── Business gauges ─────────────────────────────────────────────────────
    pub static ref OPEN_REQUESTS_GAUGE: Gauge = register_gauge!(
        "nitoagua_open_requests",
        "Requests waiting for offers"
    ).unwrap();

    pub static ref ACTIVE_OFFERS_GAUGE: Gauge = register_gauge!(
        "nitoagua_active_offers",
        "Offers currently active"
    ).unwrap();

    pub static ref SUPPLIERS_GAUGE: GaugeVec = register_gauge_vec!(
        "nitoagua_suppliers",
        "Suppliers by verification status",
        &["status"]
    ).unwrap();
}

pub fn record_notification(channel: &str, ok: bool) {
    NOTIFICATIONS_SENT
        .with_label_values(&[channel, if ok { "ok" } else { "error" }])
        .inc();
}

/// Spawn the background gauge collector (refreshes every 5 minutes).
pub fn start(pool: PgPool) {
    tokio::spawn(async move {
        loop {
            if let Err(e) = collect(&pool).await {
                warn!("Metrics: collection failed: {}", e);
            }
            tokio::time::sleep(tokio::time::Duration::from_secs(300)).await;
        }
    });
}

async fn collect(pool: &PgPool) -> anyhow::Result<()> {
    let open: i64 = sqlx::query_scalar(
        "SELECT COUNT(*)::BIGINT FROM water_requests WHERE status = 'pending'",
    )
    .fetch_one(pool)
    .await?;
    OPEN_REQUESTS_GAUGE.set(open as f64);

    let active: i64 = sqlx::query_scalar(
        "SELECT COUNT(*)::BIGINT FROM offers WHERE status = 'active'",
    )
    .fetch_one(pool)
    .await?;
    ACTIVE_OFFERS_GAUGE.set(active as f64);

    let suppliers: Vec<(String, i64)> = sqlx::query_as(
        "SELECT COALESCE(verification_status, 'pending'), COUNT(*)::BIGINT
         FROM profiles WHERE role = 'supplier'
         GROUP BY 1",
    )
    .fetch_all(pool)
    .await?;
    for (status, count) in &suppliers {
        SUPPLIERS_GAUGE.with_label_values(&[status.as_str()]).set(*count as f64);
    }

    info!(
        "Metrics: {} open request(s), {} active offer(s)",
        open, active
    );
    Ok(())
}
