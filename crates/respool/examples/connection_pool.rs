//! Connection pooling example.
//!
//! This example pools an in-process stand-in for a database connection and
//! shows borrowing, automatic return on drop, rollback of abandoned
//! transactions, exhaustion, and async borrowing.
//!
//! # Running
//!
//! ```bash
//! cargo run -p respool --example connection_pool
//! ```

// Allow common patterns in example code
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use respool::connection::{ConnectionPolicy, ManagedConnection, TransactionStatus};
use respool::{PoolConfig, PoolError};

/// A pretend database session.
struct DemoConnection {
    id: usize,
    status: TransactionStatus,
}

impl DemoConnection {
    fn execute(&mut self, sql: &str) {
        if sql.eq_ignore_ascii_case("BEGIN") {
            self.status = TransactionStatus::InTransaction;
        }
        println!("  [conn {}] {sql}", self.id);
    }
}

impl ManagedConnection for DemoConnection {
    fn is_open(&self) -> bool {
        true
    }

    fn ping(&mut self, _query: &str) -> bool {
        true
    }

    fn transaction_status(&self) -> TransactionStatus {
        self.status
    }

    fn rollback(&mut self) {
        println!("  [conn {}] ROLLBACK (left open by previous borrower)", self.id);
        self.status = TransactionStatus::Idle;
    }

    fn close(self) {
        println!("  [conn {}] closed", self.id);
    }
}

fn print_pool_status<F>(pool: &respool::connection::ConnectionPool<F>)
where
    F: Fn() -> Result<DemoConnection, String> + Send + Sync,
{
    let status = pool.status();
    println!(
        "  idle={} in_use={} capacity={} created={} destroyed={}",
        status.idle, status.in_use, status.capacity, status.created, status.destroyed
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("=== Connection Pool Example ===\n");

    let next_id = AtomicUsize::new(0);
    let pool_config = PoolConfig::new(4)
        .min_idle(2)
        .max_idle(3)
        .retry(2)
        .wait(Duration::from_millis(200));

    println!("Pool configuration:");
    println!("  Capacity: {}", pool_config.capacity);
    println!("  Min idle: {}", pool_config.min_idle);
    println!("  Max idle: {}", pool_config.max_idle);
    println!("  Wait: {:?}", pool_config.wait);
    println!();

    let pool = ConnectionPolicy::new(move || {
        Ok::<_, String>(DemoConnection {
            id: next_id.fetch_add(1, Ordering::SeqCst),
            status: TransactionStatus::Idle,
        })
    })
    .pool(pool_config)?;
    print_pool_status(&pool);

    // Example 1: Basic pool usage
    println!("\n1. Basic pool usage:");
    {
        let mut conn = pool.borrow()?;
        conn.execute("SELECT 1");
        // Connection is automatically returned to pool when dropped
    }
    print_pool_status(&pool);

    // Example 2: Abandoned transaction
    println!("\n2. Abandoned transaction:");
    {
        let mut conn = pool.borrow()?;
        conn.execute("BEGIN");
        conn.execute("UPDATE accounts SET balance = 0");
    }
    print_pool_status(&pool);

    // Example 3: Exhaustion
    println!("\n3. Exhaustion:");
    let held: Vec<_> = (0..4).map(|_| pool.borrow()).collect::<Result<_, _>>()?;
    let start = Instant::now();
    match pool.borrow() {
        Err(PoolError::Exhausted(wait)) => {
            println!("  exhausted after {:?} (wait {wait:?})", start.elapsed());
        }
        other => println!("  unexpected: {:?}", other.map(|conn| conn.id)),
    }
    drop(held);
    print_pool_status(&pool);

    // Example 4: Async borrowing
    println!("\n4. Async borrowing (8 tasks):");
    let tasks: Vec<_> = (0..8)
        .map(|task| {
            let pool = pool.clone();
            tokio::spawn(async move {
                let mut conn = pool.borrow_async().await?;
                conn.execute(&format!("SELECT {task}"));
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok::<_, PoolError>(())
            })
        })
        .collect();
    for task in tasks {
        task.await??;
    }
    print_pool_status(&pool);

    println!("\n5. Closing:");
    pool.close();
    print_pool_status(&pool);

    Ok(())
}
