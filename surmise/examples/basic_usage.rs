//! Basic usage examples demonstrating the core Surmise API
//!
//! This example shows properties over built-in possibilities, shrinking of
//! failures, error capture, rejection, score-guided search and persistence.

use surmise::{
    Config, Possibility, Property, Stop, Verdict, assume, composite, integers, labeled_event,
    named, target, text, vectors,
};

// Example 1: A passing property
fn example_1_passing_property() {
    println!("=== Example 1: Passing Property ===");

    let outcome = Property::new(
        "addition_commutes",
        (integers(-100, 100), integers(-100, 100)),
        |(a, b): (i32, i32)| a.wrapping_add(b) == b.wrapping_add(a),
    )
    .check();

    match outcome {
        Ok(outcome) if outcome.is_pass() => {
            println!("✓ Property passed ({})", outcome.stats);
        }
        Ok(outcome) => println!("✗ {}", outcome),
        Err(err) => println!("✗ Invalid configuration: {}", err),
    }
}

// Example 2: A failure shrunk to its minimal form
fn example_2_shrinking() {
    println!("\n=== Example 2: Shrinking ===");

    let outcome = Property::new("sum_is_small", vectors(integers(0u32, 1000)), |v: Vec<u32>| {
        v.iter().sum::<u32>() < 1000
    })
    .seed(42)
    .check()
    .expect("valid configuration");

    // Prints the minimal vector, its choice sequence and the seed
    println!("{}", outcome);
}

// Example 3: Panics and returned errors are reported as errors
fn example_3_errors() {
    println!("\n=== Example 3: Errors ===");

    let outcome = Property::new("parse_roundtrip", text(), |s: String| -> Result<bool, std::num::ParseIntError> {
        let n: i64 = s.parse()?;
        Ok(n.to_string() == s)
    })
    .seed(7)
    .check()
    .expect("valid configuration");

    if let Verdict::Error { example, error } = &outcome.verdict {
        println!("✗ Error kind: {}", error.kind);
        println!("  Message: {}", error.message);
        println!("  Input: {:?}", example.value);
    }
}

// Example 4: Preconditions and named arguments
fn example_4_preconditions() {
    println!("\n=== Example 4: Preconditions ===");

    let outcome = Property::new(
        "division_inverts_multiplication",
        (named("a", integers(-1000i64, 1000)), named("b", integers(-1000i64, 1000))),
        |(a, b): (i64, i64)| -> Result<bool, Stop> {
            assume(b != 0)?;
            labeled_event("sign", if a * b >= 0 { "same" } else { "mixed" });
            Ok((a * b) / b == a)
        },
    )
    .seed(1)
    .check()
    .expect("valid configuration");

    println!("✓ {}", outcome.stats);
    print!("{}", outcome.events);
}

// Example 5: Score-guided search toward a large value
fn example_5_targeting() {
    println!("\n=== Example 5: Targeting ===");

    let pair = composite(|tc| {
        let x = integers(0u32, 10_000).produce(tc)?;
        let y = integers(0u32, 10_000).produce(tc)?;
        Ok((x, y))
    });

    let outcome = Property::new("product_is_bounded", pair, |(x, y): (u32, u32)| {
        let product = u64::from(x) * u64::from(y);
        target(product as f64);
        product < 90_000_000
    })
    .config(Config::new().seed(5).max_examples(500))
    .check()
    .expect("valid configuration");

    match outcome.verdict {
        Verdict::Fail(example) => println!("✗ Found {:?}", example.value),
        Verdict::Scored { score, .. } => println!("✓ Best product reached: {}", score),
        _ => println!("{}", outcome),
    }
}

// Example 6: Persisted examples are replayed on the next run
fn example_6_persistence() {
    println!("\n=== Example 6: Persistence ===");

    let dir = std::env::temp_dir().join("surmise-basic-usage");
    let property = Property::new("no_thirteen", vectors(integers(0u8, 20)), |v: Vec<u8>| {
        !v.contains(&13)
    })
    .config(Config::new().store_dir(&dir));

    for run in 1..=2 {
        match property.check() {
            Ok(outcome) => println!(
                "  Run {}: {:?} after {} attempts",
                run,
                outcome.value(),
                outcome.stats.attempts
            ),
            Err(err) => println!("  Run {}: {}", run, err),
        }
    }
}

fn main() {
    example_1_passing_property();
    example_2_shrinking();
    example_3_errors();
    example_4_preconditions();
    example_5_targeting();
    example_6_persistence();
}
