use serde::Deserialize;

/// Tuning knobs of the router. Built once by the caller and passed to every
/// quote, the library never reads the environment itself.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct Config {
    /// Maximum relative difference between the marginal prices of the
    /// selected paths at which the allocation is considered equalized.
    pub price_error_tolerance: f64,
    /// Smallest amount step used by numerical derivatives.
    pub infinitesimal: f64,
    /// Whether joins and exits of weighted and stable pools are used as
    /// swaps between a token and the pool share token.
    pub allow_add_remove: bool,
    /// Iteration cap of the marginal price equalization.
    pub max_equalization_iterations: usize,
    /// Unix timestamp in seconds used to price pools with an expiry.
    pub current_timestamp: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            price_error_tolerance: 0.00001,
            infinitesimal: 0.000001,
            allow_add_remove: false,
            max_equalization_iterations: 100,
            current_timestamp: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_partial_config() {
        let config: Config =
            serde_json::from_str(r#"{ "allowAddRemove": true, "priceErrorTolerance": 0.001 }"#)
                .unwrap();
        assert_eq!(
            config,
            Config {
                allow_add_remove: true,
                price_error_tolerance: 0.001,
                ..Default::default()
            }
        );
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(serde_json::from_str::<Config>(r#"{ "maxPools": 4 }"#).is_err());
    }
}
