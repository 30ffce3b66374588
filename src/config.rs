use std::str::FromStr;

use envconfig::Envconfig;

use crate::codec::CodecId;
use crate::types::OrderingMode;

/// Runtime configuration for the work manager: plain env-driven fields
/// with explicit defaults.
#[derive(Envconfig, Clone, Debug)]
pub struct WorkManagerConfig {
    #[envconfig(default = "unordered")]
    pub ordering: String,

    #[envconfig(default = "1000")]
    pub max_queue: usize,

    #[envconfig(default = "5000")]
    pub max_beyond_base: usize,

    #[envconfig(default = "3")]
    pub loading_factor: u32,

    /// Testing only: pin one codec id instead of selecting the smallest.
    pub forced_codec: Option<String>,
}

impl WorkManagerConfig {
    pub fn ordering_mode(&self) -> Result<OrderingMode, String> {
        OrderingMode::from_str(&self.ordering)
    }

    pub fn forced_codec_id(&self) -> Result<Option<CodecId>, String> {
        self.forced_codec
            .as_deref()
            .map(CodecId::from_str)
            .transpose()
    }

    /// True once `remaining_work` exceeds `max_queue * loading_factor`
    /// or the hard `max_beyond_base` ceiling, whichever trips first.
    pub fn should_throttle(&self, remaining_work: usize) -> bool {
        remaining_work > self.max_queue * self.loading_factor as usize
            || remaining_work > self.max_beyond_base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_throttle_on_loading_factor() {
        let cfg = WorkManagerConfig {
            ordering: "unordered".into(),
            max_queue: 10,
            max_beyond_base: 1_000_000,
            loading_factor: 3,
            forced_codec: None,
        };
        assert!(!cfg.should_throttle(30));
        assert!(cfg.should_throttle(31));
    }

    #[test]
    fn should_throttle_on_max_beyond_base() {
        let cfg = WorkManagerConfig {
            ordering: "unordered".into(),
            max_queue: 1_000_000,
            max_beyond_base: 50,
            loading_factor: 3,
            forced_codec: None,
        };
        assert!(!cfg.should_throttle(50));
        assert!(cfg.should_throttle(51));
    }

    #[test]
    fn parses_ordering_mode() {
        let cfg = WorkManagerConfig {
            ordering: "Key".into(),
            max_queue: 1,
            max_beyond_base: 1,
            loading_factor: 1,
            forced_codec: None,
        };
        assert_eq!(cfg.ordering_mode().unwrap(), OrderingMode::Key);
    }
}
