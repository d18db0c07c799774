// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::AtomicU32;
use std::time::Duration;

use tokio::sync::Semaphore;

use super::*;

fn counting_start(
    starts: &Arc<AtomicU32>,
    gate: &Arc<Semaphore>,
    outcome: bool,
) -> impl FnOnce() -> BoxFuture<'static, bool> {
    let starts = Arc::clone(starts);
    let gate = Arc::clone(gate);
    move || {
        starts.fetch_add(1, Ordering::SeqCst);
        async move {
            let _permit = gate.acquire().await;
            outcome
        }
        .boxed()
    }
}

#[tokio::test]
async fn concurrent_callers_share_one_refresh() -> anyhow::Result<()> {
    let cell = RefreshCell::default();
    let starts = Arc::new(AtomicU32::new(0));
    let gate = Arc::new(Semaphore::new(0));

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let cell = cell.clone();
        let start = counting_start(&starts, &gate, true);
        tasks.push(tokio::spawn(async move { cell.run(start).await }));
    }
    // Let every task reach the cell before the refresh may finish.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!cell.is_idle());
    gate.add_permits(1);

    for task in tasks {
        assert!(task.await?);
    }
    assert_eq!(starts.load(Ordering::SeqCst), 1);
    assert!(cell.is_idle());
    Ok(())
}

#[tokio::test]
async fn failure_is_shared_and_cell_resets() -> anyhow::Result<()> {
    let cell = RefreshCell::default();
    let starts = Arc::new(AtomicU32::new(0));
    let gate = Arc::new(Semaphore::new(0));

    let a = tokio::spawn({
        let cell = cell.clone();
        let start = counting_start(&starts, &gate, false);
        async move { cell.run(start).await }
    });
    let b = tokio::spawn({
        let cell = cell.clone();
        let start = counting_start(&starts, &gate, false);
        async move { cell.run(start).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    gate.add_permits(1);

    assert!(!a.await?);
    assert!(!b.await?);
    assert_eq!(starts.load(Ordering::SeqCst), 1);
    assert!(cell.is_idle());
    Ok(())
}

#[tokio::test]
async fn sequential_refreshes_start_fresh() -> anyhow::Result<()> {
    let cell = RefreshCell::default();
    let starts = Arc::new(AtomicU32::new(0));
    let gate = Arc::new(Semaphore::new(10));

    assert!(cell.run(counting_start(&starts, &gate, true)).await);
    assert!(!cell.run(counting_start(&starts, &gate, false)).await);
    assert_eq!(starts.load(Ordering::SeqCst), 2);
    assert!(cell.is_idle());
    Ok(())
}

#[tokio::test]
async fn panicking_refresh_does_not_wedge_the_cell() -> anyhow::Result<()> {
    let cell = RefreshCell::default();

    let handle = tokio::spawn({
        let cell = cell.clone();
        async move {
            cell.run(|| futures_util::future::lazy(|_| -> bool { panic!("refresh exploded") }).boxed())
                .await
        }
    });
    assert!(handle.await.is_err());
    assert!(cell.is_idle());

    let starts = Arc::new(AtomicU32::new(0));
    let gate = Arc::new(Semaphore::new(1));
    assert!(cell.run(counting_start(&starts, &gate, true)).await);
    Ok(())
}

#[tokio::test]
async fn abandoned_waiter_leaves_refresh_joinable() -> anyhow::Result<()> {
    let cell = RefreshCell::default();
    let starts = Arc::new(AtomicU32::new(0));
    let gate = Arc::new(Semaphore::new(0));

    let first = tokio::time::timeout(
        Duration::from_millis(20),
        cell.run(counting_start(&starts, &gate, true)),
    )
    .await;
    assert!(first.is_err(), "first waiter should time out");

    gate.add_permits(1);
    assert!(cell.run(counting_start(&starts, &gate, false)).await);
    assert_eq!(starts.load(Ordering::SeqCst), 1);
    assert!(cell.is_idle());
    Ok(())
}
