//! A data screen driven end to end through the app context.

use std::sync::Arc;
use std::time::Duration;

use gympulse_cache::{QueryKey, Resource};
use gympulse_client::{AppContext, RefreshFailed, RefreshOutcome, RefreshSource, ScreenData};
use gympulse_test_utils::{fixtures, InMemoryGymDirectory, ScriptedLoader};

type Members = Vec<String>;

async fn signed_in() -> (AppContext<InMemoryGymDirectory>, QueryKey) {
    let (principal, _, directory) = fixtures::owner_with_gym();
    let ctx = AppContext::new(fixtures::no_retry_config(), Arc::new(directory)).unwrap();
    ctx.init();
    ctx.set_principal(Some(principal)).await;
    let key = ctx.query_key(Resource::Members).unwrap();
    (ctx, key)
}

fn refresh_source(
    ctx: &AppContext<InMemoryGymDirectory>,
    key: &QueryKey,
    loader: &ScriptedLoader<Members>,
) -> Arc<dyn RefreshSource> {
    let cache = ctx.cache().clone();
    let options = ctx.fetch_options();
    let key = key.clone();
    let loader = loader.clone();
    Arc::new(move || {
        let cache = cache.clone();
        let options = options.clone();
        let key = key.clone();
        let load = loader.loader();
        async move {
            cache
                .refetch(&key, load, options)
                .await
                .map(|_| ())
                .map_err(RefreshFailed::from)
        }
    })
}

#[tokio::test(start_paused = true)]
async fn failed_refresh_keeps_showing_members() {
    let (ctx, key) = signed_in().await;
    let loader = ScriptedLoader::failing("connection reset").then_ok(vec!["ana".to_string()]);

    let screen = ScreenData::<Members>::from_cache(ctx.cache(), &key).unwrap();
    assert!(screen.is_loading());

    ctx.cache()
        .fetch(&key, loader.loader(), ctx.fetch_options())
        .await
        .unwrap();
    let refresher = ctx.auto_refresh(refresh_source(&ctx, &key, &loader));

    let outcome = refresher.debounced_refresh().await;
    assert_eq!(outcome, RefreshOutcome::Failed(RefreshFailed::new("connection reset")));

    let screen = ScreenData::<Members>::from_cache(ctx.cache(), &key).unwrap();
    assert_eq!(screen.data(), Some(&vec!["ana".to_string()]));
    assert_eq!(screen.error(), Some("connection reset"));
    assert!(!screen.is_blocking_error());

    // The timer keeps trying; once the backend is back the error goes away.
    loader.set_fallback(Ok(vec!["ana".to_string(), "bo".to_string()]));
    tokio::time::sleep(Duration::from_millis(30_001)).await;
    let screen = ScreenData::<Members>::from_cache(ctx.cache(), &key).unwrap();
    assert_eq!(screen.data().map(Vec::len), Some(2));
    assert_eq!(screen.error(), None);

    ctx.dispose();
}

#[tokio::test(start_paused = true)]
async fn guard_from_context_uses_configured_timeout() {
    let (ctx, key) = signed_in().await;
    let guard = ctx.navigation_guard();
    assert_eq!(guard.timeout(), Duration::from_millis(4_000));

    let loader = ScriptedLoader::returning(vec!["ana".to_string()]);
    ctx.cache().fetch(&key, loader.loader(), ctx.fetch_options()).await.unwrap();
    let screen = ScreenData::<Members>::from_cache(ctx.cache(), &key).unwrap();
    guard.set_has_data_hint(screen.data().is_some());
    guard.set_loading(true);

    tokio::time::sleep(Duration::from_millis(4_001)).await;
    assert!(!guard.is_loading());
}

#[tokio::test(start_paused = true)]
async fn reconnect_revalidates_stale_observed_entries() {
    let (ctx, key) = signed_in().await;
    let loader = ScriptedLoader::returning(vec!["ana".to_string()]);
    let _observer = ctx.cache().observe(&key);
    ctx.cache().fetch(&key, loader.loader(), ctx.fetch_options()).await.unwrap();

    // Fresh entries are left alone.
    assert_eq!(ctx.on_reconnect(), 0);

    tokio::time::sleep(ctx.config().cache.stale_window() + Duration::from_millis(1)).await;
    assert_eq!(ctx.on_reconnect(), 1);
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(loader.calls(), 2);

    // Focus refetching is off by default.
    tokio::time::sleep(ctx.config().cache.stale_window() + Duration::from_millis(1)).await;
    assert_eq!(ctx.on_window_focus(), 0);
}
