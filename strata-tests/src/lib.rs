mod common;
mod crud;
mod increments;
mod models;
mod sequences;
mod transactions;

use crate::{
    crud::{create_read, remove_delete},
    increments::increments,
    models::models,
    sequences::sequences,
    transactions::{error_rollback, gating, idempotent_begin},
};
use log::LevelFilter;
use std::{env, sync::LazyLock};
use strata::Pool;
use tokio::sync::Mutex;

pub use common::{Recorder, USERS, database};

pub fn init_logs() {
    let mut logger = env_logger::builder();
    logger
        .is_test(true)
        .format_file(true)
        .format_line_number(true);
    if env::var("RUST_LOG").is_err() {
        logger.filter_level(LevelFilter::Warn);
    }
    let _ = logger.try_init();
}

static MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

/// Run every scenario against `pool`, the tables are recreated by each scenario.
pub async fn execute_tests<P: Pool + Clone>(pool: P) {
    let _lock = MUTEX.lock().await;
    create_read(pool.clone()).await;
    remove_delete(pool.clone()).await;
    increments(pool.clone()).await;
    gating(pool.clone()).await;
    error_rollback(pool.clone()).await;
    idempotent_begin(pool.clone()).await;
    models(pool.clone()).await;
    sequences(pool.clone()).await;
}

#[macro_export]
macro_rules! silent_logs {
    ($($code:tt)+) => {{
        let level = log::max_level();
        log::set_max_level(log::LevelFilter::Off);
        $($code)+
        log::set_max_level(level);
    }};
}
