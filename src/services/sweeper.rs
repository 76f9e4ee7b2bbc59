// services/sweeper.rs
//
// Background reconciliation for payments whose STK callback never arrived.
// Records stuck in `processing` past the expiry window move to `expired`;
// the status guard means a callback racing the sweep wins whichever update
// lands first and the loser is a no-op.
use std::time::Duration;

use chrono::Utc;
use mongodb::bson::{self, doc};
use mongodb::{Collection, Database};
use tracing::{error, info};

use crate::models::payment::PaymentRecord;

const SWEEP_TICK: Duration = Duration::from_secs(30);

pub async fn run(db: Database, expiry_secs: u64) {
    let expiry = chrono::Duration::seconds(expiry_secs as i64);
    let collection: Collection<PaymentRecord> = db.collection("payments");

    info!("Payment expiry sweep running ({}s window)", expiry_secs);

    let mut ticker = tokio::time::interval(SWEEP_TICK);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let cutoff = bson::DateTime::from_chrono(Utc::now() - expiry);
        let result = collection
            .update_many(
                doc! {
                    "status": "processing",
                    "updated_at": { "$lt": cutoff },
                },
                doc! {
                    "$set": {
                        "status": "expired",
                        "result_desc": "Payment request timed out",
                        "updated_at": bson::DateTime::now(),
                    }
                },
            )
            .await;

        match result {
            Ok(outcome) if outcome.modified_count > 0 => {
                info!("Expired {} stale payment(s)", outcome.modified_count);
            }
            Ok(_) => {}
            Err(e) => error!("Payment expiry sweep failed: {}", e),
        }
    }
}
