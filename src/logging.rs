//! Logging setup.
//!
//! Runner components log through `tracing` under the `unified::*` targets:
//!
//! | Target | Component |
//! |--------|-----------|
//! | `unified::runner` | file and test orchestration, skips, teardown |
//! | `unified::entity` | entity construction and teardown |
//! | `unified::executor` | each operation |
//! | `unified::memory` | the in-memory driver |

use tracing_subscriber::EnvFilter;

/// Install a formatting subscriber.
///
/// `RUST_LOG` wins over `filter` when set. Returns `false` if a global
/// subscriber was already installed, which makes repeated calls from tests
/// harmless.
pub fn init_tracing(filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .ok()
        .or_else(|| EnvFilter::try_new(filter).ok())
        .unwrap_or_else(|| EnvFilter::new("unified=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_harmless() {
        init_tracing("unified=debug");
        assert!(!init_tracing("not a valid filter ==="));
    }
}
