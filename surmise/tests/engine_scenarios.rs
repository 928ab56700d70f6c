use std::sync::{Arc, Mutex};

use surmise::*;

fn seeded(seed: u64) -> Config {
    Config::new().seed(seed)
}

#[test]
fn test_minimal_failure_for_small_range() {
    for seed in [1, 2, 3, 42] {
        let outcome = Property::new("lt_five", integers(0, 10), |x: i32| x < 5)
            .config(seeded(seed))
            .check()
            .unwrap();

        assert!(outcome.is_falsified());
        assert_eq!(outcome.value(), Some(&5));
        assert_eq!(outcome.record().unwrap().choices.len(), 1);
    }
}

#[test]
fn test_error_dominates_failure() {
    let outcome = Property::new(
        "sum_with_equal_panic",
        (integers(0, 100), integers(0, 100)),
        |(a, b): (i32, i32)| {
            if a == b {
                panic!("a and b are equal: {}", a);
            }
            a + b < 10
        },
    )
    .config(seeded(9))
    .check()
    .unwrap();

    match &outcome.verdict {
        Verdict::Error { example, error } => {
            assert!(error.kind.starts_with("panic at "));
            assert!(error.message.contains("equal"));
            assert_eq!(example.value, Some((0, 0)));
        }
        other => panic!("expected an error verdict, got {:?}", other),
    }
    assert!(!outcome.is_pass());
}

#[test]
fn test_stored_example_is_the_first_attempt() {
    let store = Arc::new(InMemoryStore::new());
    let seen = Mutex::new(Vec::new());

    let property = Property::new("stored", integers(0u64, u64::MAX), |x: u64| {
        seen.lock().unwrap().push(x);
        x != 12_345
    })
    .config(seeded(5).store(store.clone()));

    store
        .store(&StoredExample::new(
            property.key(),
            Record {
                choices: vec![12_345],
                generation: 1,
                max_choices: 100,
            },
            ExampleKind::Fail,
        ))
        .unwrap();

    let outcome = property.check().unwrap();
    assert_eq!(seen.lock().unwrap()[0], 12_345);
    assert_eq!(outcome.value(), Some(&12_345));
}

#[test]
fn test_rejection_budget_is_exact() {
    let outcome = Property::new("always_rejects", integers(0, 1000), |_: i32| -> Result<bool, Stop> {
        Err(reject())
    })
    .config(seeded(4).max_rejections(50))
    .check()
    .unwrap();

    assert!(matches!(outcome.verdict, Verdict::Exhausted { valid: 0, invalid: 50 }));
    assert_eq!(outcome.stats.attempts, 50);
    assert_eq!(outcome.stats.rejected, 50);
    assert!(!outcome.is_pass());
    assert!(outcome.to_string().contains("gave up"));
}

#[test]
fn test_overruns_count_as_invalid() {
    let outcome = Property::new("too_long", vectors(integers(0, 9)).min_len(10), |_: Vec<i32>| true)
        .config(seeded(4).max_choices(5).max_rejections(20))
        .check()
        .unwrap();

    assert!(outcome.is_exhausted());
    assert_eq!(outcome.stats.overrun, 20);
    assert_eq!(outcome.stats.rejected, 0);
}

#[test]
fn test_best_score_is_the_maximum_observed() {
    let scores = Mutex::new(Vec::new());
    let outcome = Property::new("maximize", integers(0u32, 10_000), |x: u32| {
        let score = f64::from(x);
        scores.lock().unwrap().push(score);
        target(score);
        true
    })
    .config(seeded(8).max_examples(300))
    .check()
    .unwrap();

    let best = scores.lock().unwrap().iter().cloned().fold(f64::MIN, f64::max);
    assert!(outcome.is_pass());
    assert_eq!(outcome.score(), Some(best));
    assert_eq!(outcome.value().map(|x| f64::from(*x)), Some(best));
    assert!(outcome.stats.targeted > 0);
}

#[test]
fn test_same_seed_same_result() {
    let run = || {
        Property::new("sum_small", vectors(integers(0u32, 1000)), |v: Vec<u32>| {
            v.iter().sum::<u32>() < 1500
        })
        .config(seeded(77))
        .check()
        .unwrap()
    };
    let first = run();
    let second = run();

    assert!(first.is_falsified());
    assert_eq!(first.record(), second.record());
    assert_eq!(first.value(), second.value());
    assert_eq!(first.stats.attempts, second.stats.attempts);
}

#[test]
fn test_shrinking_never_regresses_and_is_idempotent() {
    let property = Property::new("sum_small", vectors(integers(0u32, 1000)), |v: Vec<u32>| {
        v.iter().sum::<u32>() < 1500
    });

    let original = [1, 900, 1, 20, 1, 800, 1, 5, 0];
    assert_eq!(property.replay(&original).status, Status::Interesting);

    let once = property.shrink_from(&original).unwrap();
    assert!(simpler(&once.choices, &original));
    assert_eq!(property.replay(&once.choices).status, Status::Interesting);

    let twice = property.shrink_from(&once.choices).unwrap();
    assert_eq!(twice.choices, once.choices);
}

#[test]
fn test_events_are_tallied_per_attempt() {
    let outcome = Property::new("parity", integers(0u32, 1000), |x: u32| {
        labeled_event("even", x % 2 == 0);
        true
    })
    .config(seeded(6).max_examples(50))
    .check()
    .unwrap();

    let events = &outcome.events;
    assert_eq!(events.attempts(), 50);
    assert_eq!(events.count("even", "true") + events.count("even", "false"), 50);
}

#[test]
fn test_failure_report_names_arguments() {
    let outcome = Property::new(
        "ordered",
        (named("low", integers(0, 50)), named("high", integers(0, 50))),
        |(low, high): (i32, i32)| low <= high,
    )
    .config(seeded(12))
    .check()
    .unwrap();

    let report = outcome.to_string();
    assert!(report.contains("Property ordered::(i32, i32) FAILED"));
    assert!(report.contains("low = 1"));
    assert!(report.contains("high = 0"));
    assert!(report.contains("Seed: 12"));
}

#[test]
#[should_panic(expected = "FAILED")]
fn test_assert_panics_with_report() {
    Property::new("never", booleans(), |_: bool| false)
        .config(seeded(1))
        .assert();
}
