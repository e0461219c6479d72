//! Memocache demo
//!
//! Memoizes a slow user lookup behind a 2 second cache slot and shows the
//! entry being reloaded once the evictor has swept it.

use std::time::Duration;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use memocache::{Cache, CacheConfig, ExpiryPolicy};

const USER_TTL: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone)]
struct User {
    id: u64,
    name: String,
    email: String,
}

/// Stands in for a database query.
async fn load_user_from_db(id: u64) -> Result<Option<User>> {
    info!("Loading user {} from database...", id);
    tokio::time::sleep(Duration::from_millis(200)).await;

    Ok(Some(User {
        id,
        name: "Magnus".to_string(),
        email: "magnus@goat.com".to_string(),
    }))
}

fn log_user(label: &str, user: &Option<User>) {
    match user {
        Some(user) => info!("{}: #{} {} <{}>", label, user.id, user.name, user.email),
        None => info!("{}: no such user", label),
    }
}

/// Runs the lookup / cached lookup / expired lookup sequence.
///
/// # Environment Variables
/// - `RUST_LOG` - log filter (default: memocache=info)
/// - `CACHE_SWEEP_INTERVAL_MS` - evictor interval (default: 10000)
#[tokio::main]
async fn main() -> Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "memocache=info,memocache_demo=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = CacheConfig::from_env();
    let expire_wait = USER_TTL + config.sweep_interval;
    info!(
        "Configuration loaded: ttl={:?}, sweep_interval={:?}",
        USER_TTL, config.sweep_interval
    );

    let users: Cache<u64, User> = Cache::with_config(ExpiryPolicy::ttl(USER_TTL)?, config)?;
    let user_id = 1;

    let user = users
        .get_or_compute_async(user_id, || load_user_from_db(user_id))
        .await?;
    log_user("First lookup", &user);

    tokio::time::sleep(Duration::from_millis(1000)).await;

    // Still cached, the loader is not called
    let user = users
        .get_or_compute_async(user_id, || load_user_from_db(user_id))
        .await?;
    log_user("Second lookup", &user);

    info!("Waiting {:?} for the entry to be swept", expire_wait);
    tokio::time::sleep(expire_wait).await;

    let user = users
        .get_or_compute_async(user_id, || load_user_from_db(user_id))
        .await?;
    log_user("Third lookup", &user);

    let stats = users.stats();
    info!(
        "Done: hits={}, misses={}, evictions={}, hit_rate={:.2}",
        stats.hits,
        stats.misses,
        stats.evictions,
        stats.hit_rate()
    );

    Ok(())
}
