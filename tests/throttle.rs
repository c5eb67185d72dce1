//! Volume throttle and rate-limit cooldown

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use common::{FakePlaybackService, context};
use nfc_jukebox::{ThrottleOutcome, Volume};

fn vol(percent: u8) -> Volume {
    Volume::new(percent).unwrap()
}

#[tokio::test(start_paused = true)]
async fn spaced_large_changes_are_all_applied() {
    let service = Arc::new(FakePlaybackService::new());
    let ctx = context(&service);

    assert_eq!(ctx.throttle.request_volume(vol(40)).await, ThrottleOutcome::Applied);
    tokio::time::advance(Duration::from_millis(250)).await;
    assert_eq!(ctx.throttle.request_volume(vol(50)).await, ThrottleOutcome::Applied);
    tokio::time::advance(Duration::from_millis(250)).await;
    assert_eq!(ctx.throttle.request_volume(vol(30)).await, ThrottleOutcome::Applied);

    assert_eq!(service.volume_calls().await, vec![40, 50, 30]);
    assert_eq!(ctx.throttle.last_volume().await, Some(vol(30)));
}

#[tokio::test(start_paused = true)]
async fn change_inside_interval_is_dropped() {
    let service = Arc::new(FakePlaybackService::new());
    let ctx = context(&service);

    assert_eq!(ctx.throttle.request_volume(vol(40)).await, ThrottleOutcome::Applied);
    tokio::time::advance(Duration::from_millis(100)).await;
    assert_eq!(ctx.throttle.request_volume(vol(90)).await, ThrottleOutcome::TooSoon);

    assert_eq!(service.volume_calls().await, vec![40]);
    assert_eq!(ctx.throttle.last_volume().await, Some(vol(40)));
}

#[tokio::test(start_paused = true)]
async fn change_exactly_one_interval_later_is_applied() {
    let service = Arc::new(FakePlaybackService::new());
    let ctx = context(&service);

    assert_eq!(ctx.throttle.request_volume(vol(40)).await, ThrottleOutcome::Applied);
    tokio::time::advance(Duration::from_millis(199)).await;
    assert_eq!(ctx.throttle.request_volume(vol(60)).await, ThrottleOutcome::TooSoon);
    tokio::time::advance(Duration::from_millis(1)).await;
    assert_eq!(ctx.throttle.request_volume(vol(60)).await, ThrottleOutcome::Applied);

    assert_eq!(service.volume_calls().await, vec![40, 60]);
}

#[tokio::test(start_paused = true)]
async fn small_change_is_dropped_however_late() {
    let service = Arc::new(FakePlaybackService::new());
    let ctx = context(&service);

    ctx.throttle.request_volume(vol(40)).await;
    tokio::time::advance(Duration::from_secs(30)).await;

    assert_eq!(ctx.throttle.request_volume(vol(44)).await, ThrottleOutcome::TooSmall);
    assert_eq!(ctx.throttle.request_volume(vol(36)).await, ThrottleOutcome::TooSmall);
    assert_eq!(ctx.throttle.request_volume(vol(45)).await, ThrottleOutcome::Applied);

    assert_eq!(service.volume_calls().await, vec![40, 45]);
}

#[tokio::test(start_paused = true)]
async fn racing_requests_apply_exactly_one() {
    let service = Arc::new(FakePlaybackService::new());
    let ctx = context(&service);

    let a = tokio::spawn({
        let throttle = Arc::clone(&ctx.throttle);
        async move { throttle.request_volume(vol(20)).await }
    });
    let b = tokio::spawn({
        let throttle = Arc::clone(&ctx.throttle);
        async move { throttle.request_volume(vol(80)).await }
    });

    let outcomes = [a.await.unwrap(), b.await.unwrap()];
    let applied = outcomes.iter().filter(|o| o.is_applied()).count();

    assert_eq!(applied, 1);
    assert!(outcomes.contains(&ThrottleOutcome::TooSoon));
    assert_eq!(service.volume_calls().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn rate_limit_backs_off_without_recording() {
    let service = Arc::new(FakePlaybackService::new());
    let ctx = context(&service);
    service.rate_limit_next(1);

    let started = Instant::now();
    assert_eq!(ctx.throttle.request_volume(vol(40)).await, ThrottleOutcome::Failed);
    assert!(started.elapsed() >= Duration::from_secs(10));

    // The limited request is not retried and not remembered
    assert_eq!(ctx.throttle.last_volume().await, None);
    assert_eq!(service.volume_calls().await, vec![40]);

    assert_eq!(ctx.throttle.request_volume(vol(42)).await, ThrottleOutcome::Applied);
    assert_eq!(service.volume_calls().await, vec![40, 42]);
}

#[tokio::test(start_paused = true)]
async fn requests_during_cooldown_are_skipped() {
    let service = Arc::new(FakePlaybackService::new());
    let ctx = context(&service);
    service.rate_limit_next(1);

    let limited = tokio::spawn({
        let throttle = Arc::clone(&ctx.throttle);
        async move { throttle.request_volume(vol(40)).await }
    });

    // Let the first request hit the limit and start its backoff
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert!(ctx.actuator.is_cooling_down());

    // The lock is free again, but the call never leaves the process
    assert_eq!(ctx.throttle.request_volume(vol(70)).await, ThrottleOutcome::Failed);
    assert!(!ctx.actuator.pause().await);
    assert_eq!(service.calls().await.len(), 1);

    assert_eq!(limited.await.unwrap(), ThrottleOutcome::Failed);
    assert!(!ctx.actuator.is_cooling_down());
}

#[tokio::test(start_paused = true)]
async fn shutdown_cuts_backoff_short() {
    let service = Arc::new(FakePlaybackService::new());
    let ctx = context(&service);
    service.rate_limit_next(1);

    let started = Instant::now();
    let limited = tokio::spawn({
        let throttle = Arc::clone(&ctx.throttle);
        async move { throttle.request_volume(vol(40)).await }
    });

    tokio::time::sleep(Duration::from_secs(1)).await;
    ctx.shutdown.trigger();

    assert_eq!(limited.await.unwrap(), ThrottleOutcome::Failed);
    assert!(started.elapsed() < Duration::from_secs(10));
}
