use std::collections::HashMap;

pub fn get_param(params: &HashMap<String, f64>, key: &str, default: f64) -> f64 {
    let value = params.get(key).copied().unwrap_or(default);
    if value.is_finite() {
        value
    } else {
        default
    }
}

pub fn get_param_usize(params: &HashMap<String, f64>, key: &str, default: usize) -> usize {
    let value = get_param(params, key, default as f64);
    if value < 0.0 {
        default
    } else {
        value.round() as usize
    }
}

/// Booleans travel through parameter maps as 0.0/1.0; anything >= 0.5 is true.
pub fn get_param_bool(params: &HashMap<String, f64>, key: &str, default: bool) -> bool {
    get_param(params, key, if default { 1.0 } else { 0.0 }) >= 0.5
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn falls_back_on_missing_or_non_finite() {
        let p = params(&[("a", f64::NAN), ("b", 2.0)]);
        assert_eq!(get_param(&p, "a", 7.0), 7.0);
        assert_eq!(get_param(&p, "b", 7.0), 2.0);
        assert_eq!(get_param(&p, "missing", 7.0), 7.0);
    }

    #[test]
    fn usize_params_round_and_guard_negatives() {
        let p = params(&[("period", 14.4), ("neg", -3.0)]);
        assert_eq!(get_param_usize(&p, "period", 10), 14);
        assert_eq!(get_param_usize(&p, "neg", 10), 10);
    }

    #[test]
    fn bool_params_use_half_threshold() {
        let p = params(&[("on", 1.0), ("off", 0.2)]);
        assert!(get_param_bool(&p, "on", false));
        assert!(!get_param_bool(&p, "off", true));
        assert!(get_param_bool(&p, "missing", true));
    }
}
