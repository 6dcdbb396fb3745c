//! Navigation watchdog behaviour under a paused clock.

use std::time::Duration;

use gympulse_client::{NavigationTimeoutGuard, WatchdogState};
use gympulse_core::NavigationSettings;
use proptest::prelude::*;

fn default_guard() -> NavigationTimeoutGuard {
    NavigationTimeoutGuard::new(&NavigationSettings::default())
}

#[tokio::test(start_paused = true)]
async fn fires_once_at_timeout_when_data_is_shown() {
    let guard = default_guard();
    let mut loading_rx = guard.subscribe();
    guard.set_has_data_hint(true);
    guard.set_loading(true);
    loading_rx.borrow_and_update();

    tokio::time::sleep(Duration::from_millis(3_999)).await;
    assert!(guard.is_loading());

    tokio::time::sleep(Duration::from_millis(2)).await;
    assert!(!guard.is_loading());
    assert_eq!(guard.forced_clears(), 1);
    assert_eq!(guard.watchdog_state(), WatchdogState::Disarmed);
    assert!(loading_rx.has_changed().unwrap());
    assert!(!*loading_rx.borrow_and_update());

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(guard.forced_clears(), 1);
    assert!(!loading_rx.has_changed().unwrap());
}

#[tokio::test(start_paused = true)]
async fn waits_for_auth_when_nothing_is_shown() {
    let guard = default_guard();
    guard.set_has_data_hint(false);
    guard.set_loading(true);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(guard.is_loading());
    assert_eq!(guard.forced_clears(), 0);
    assert_eq!(guard.watchdog_state(), WatchdogState::Deferred);

    // Auth resolved and the screen finished on its own.
    guard.set_loading(false);
    assert_eq!(guard.watchdog_state(), WatchdogState::Disarmed);
}

#[tokio::test(start_paused = true)]
async fn data_hint_is_read_when_the_timer_fires() {
    let guard = default_guard();
    guard.set_loading(true);
    tokio::time::sleep(Duration::from_millis(2_000)).await;
    guard.set_has_data_hint(true);

    tokio::time::sleep(Duration::from_millis(2_001)).await;
    assert!(!guard.is_loading());
}

#[tokio::test(start_paused = true)]
async fn each_load_gets_its_own_timer() {
    let guard = default_guard();
    guard.set_has_data_hint(true);

    guard.set_loading(true);
    tokio::time::sleep(Duration::from_millis(3_000)).await;
    guard.set_loading(false);
    guard.set_loading(true);

    // The first load's deadline passes without effect.
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert!(guard.is_loading());

    tokio::time::sleep(Duration::from_millis(2_501)).await;
    assert!(!guard.is_loading());
    assert_eq!(guard.forced_clears(), 1);
}

#[tokio::test(start_paused = true)]
async fn double_teardown_is_harmless() {
    let guard = default_guard();
    guard.set_has_data_hint(true);
    guard.set_loading(true);

    assert!(guard.teardown());
    assert!(!guard.teardown());
    guard.set_loading(false);
    guard.set_loading(true);
    drop(guard);

    tokio::time::sleep(Duration::from_secs(10)).await;
}

#[derive(Debug, Clone)]
enum Step {
    Loading(bool),
    DataHint(bool),
    Wait(u64),
    NavigateAway,
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        any::<bool>().prop_map(Step::Loading),
        any::<bool>().prop_map(Step::DataHint),
        (0u64..6_000).prop_map(Step::Wait),
        Just(Step::NavigateAway),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// The guard only ever turns loading off: whenever the flag reads true,
    /// the last flag the screen reported was true.
    #[test]
    fn never_sets_loading_true(
        steps in proptest::collection::vec(arb_step(), 1..30),
        timeout_ms in 1u64..8_000,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();

        let violations = runtime.block_on(async {
            let guard = NavigationTimeoutGuard::with_timeout(
                Duration::from_millis(timeout_ms),
                Duration::from_millis(5_000),
            );
            let mut reported = false;
            let mut violations = 0;
            for step in &steps {
                match step {
                    Step::Loading(loading) => {
                        guard.set_loading(*loading);
                        reported = *loading;
                    }
                    Step::DataHint(hint) => guard.set_has_data_hint(*hint),
                    Step::Wait(ms) => tokio::time::sleep(Duration::from_millis(*ms)).await,
                    Step::NavigateAway => {
                        guard.navigate_away();
                        reported = false;
                    }
                }
                if guard.is_loading() && !reported {
                    violations += 1;
                }
            }
            violations
        });

        prop_assert_eq!(violations, 0);
    }

    /// Without data and with a timeout under the auth ceiling, only the
    /// screen itself can clear loading.
    #[test]
    fn never_clears_without_data_under_auth_ceiling(
        steps in proptest::collection::vec(
            prop_oneof![
                any::<bool>().prop_map(Step::Loading),
                (0u64..10_000).prop_map(Step::Wait),
            ],
            1..30,
        ),
        timeout_ms in 1u64..=5_000,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();

        let (matches_reported, forced) = runtime.block_on(async {
            let guard = NavigationTimeoutGuard::with_timeout(
                Duration::from_millis(timeout_ms),
                Duration::from_millis(5_000),
            );
            let mut reported = false;
            let mut matches_reported = true;
            for step in &steps {
                match step {
                    Step::Loading(loading) => {
                        guard.set_loading(*loading);
                        reported = *loading;
                    }
                    Step::Wait(ms) => tokio::time::sleep(Duration::from_millis(*ms)).await,
                    _ => {}
                }
                matches_reported &= guard.is_loading() == reported;
            }
            (matches_reported, guard.forced_clears())
        });

        prop_assert!(matches_reported);
        prop_assert_eq!(forced, 0);
    }
}
