#![allow(dead_code)]

use probemap::{HashMap, ResizeMode};

// Run the test on different configurations of a `HashMap`.
pub fn with_map<K, V>(mut test: impl FnMut(&dyn Fn() -> HashMap<K, V>)) {
    // Manual resize mode with a table large enough to never fill up.
    if !cfg!(probemap_stress) {
        test(
            &(|| {
                HashMap::builder()
                    .capacity(1 << 18)
                    .resize_mode(ResizeMode::Manual)
                    .build()
            }),
        );
    }

    // Automatic resizing from the default capacity.
    test(&(|| HashMap::builder().resize_mode(ResizeMode::Double).build()));

    // Automatic resizing from a single slot to stress repeated grows.
    test(
        &(|| {
            HashMap::builder()
                .capacity(1)
                .resize_mode(ResizeMode::Double)
                .build()
        }),
    );
}

// Prints a log message if `RUST_LOG=debug` is set.
#[macro_export]
macro_rules! debug {
    ($($x:tt)*) => {
        if std::env::var("RUST_LOG").as_deref() == Ok("debug") {
            println!($($x)*);
        }
    };
}

// Returns the number of threads to use for stress testing.
pub fn threads() -> usize {
    if cfg!(miri) {
        2
    } else {
        num_cpus::get_physical().next_power_of_two().min(8)
    }
}
