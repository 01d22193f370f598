//! Settings form handling. Blank fields keep their current value.

use riskscan_core::settings::Settings;
use std::collections::HashMap;
use std::str::FromStr;

fn field<'a>(form: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    form.get(name).map(|v| v.trim()).filter(|v| !v.is_empty())
}

fn number<T: FromStr>(form: &HashMap<String, String>, name: &str, current: T) -> Result<T, String> {
    match field(form, name) {
        Some(raw) => raw.parse().map_err(|_| format!("Invalid value for {name}: {raw}")),
        None => Ok(current),
    }
}

pub fn apply_settings_form(current: &Settings, form: &HashMap<String, String>) -> Result<Settings, String> {
    let mut next = current.clone();
    if let Some(model) = field(form, "model_name_or_path") {
        providers::ModelSpec::parse(model).map_err(|e| e.to_string())?;
        next.model_name_or_path = model.to_string();
    }
    next.threshold = number(form, "threshold", current.threshold)?;
    if !(0.0..=1.0).contains(&next.threshold) {
        return Err("Threshold must be between 0 and 1.".to_string());
    }
    next.merge_window_chars = number(form, "merge_window_chars", current.merge_window_chars)?;
    next.upload_max_mb = number(form, "upload_max_mb", current.upload_max_mb)?;
    if next.upload_max_mb == 0 {
        return Err("Upload limit must be at least 1 MB.".to_string());
    }
    if let Some(disclaimer) = field(form, "disclaimer") {
        next.disclaimer = disclaimer.to_string();
    }
    if let Some(model) = field(form, "gemini_model") {
        next.gemini_model = model.to_string();
    }
    // Checkbox: absent means off.
    next.enable_gemini = form.contains_key("enable_gemini");
    if let Some(raw) = form.get("category_thresholds") {
        next.category_thresholds = Settings::parse_category_thresholds(raw)?;
    }
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn blank_fields_keep_current_values() {
        let current = Settings::default();
        let next = apply_settings_form(&current, &form(&[("threshold", " "), ("disclaimer", "")])).unwrap();
        assert_eq!(next.threshold, current.threshold);
        assert_eq!(next.disclaimer, current.disclaimer);
        assert!(!next.enable_gemini);
    }

    #[test]
    fn applies_values_and_thresholds() {
        let next = apply_settings_form(
            &Settings::default(),
            &form(&[
                ("threshold", "0.7"),
                ("merge_window_chars", "120"),
                ("enable_gemini", "on"),
                ("category_thresholds", "Termination=0.9"),
            ]),
        )
        .unwrap();
        assert_eq!(next.threshold, 0.7);
        assert_eq!(next.merge_window_chars, 120);
        assert!(next.enable_gemini);
        assert_eq!(next.category_thresholds.get("Termination"), Some(&0.9));
    }

    #[test]
    fn rejects_out_of_range_numbers() {
        let current = Settings::default();
        assert!(apply_settings_form(&current, &form(&[("threshold", "1.5")])).is_err());
        assert!(apply_settings_form(&current, &form(&[("upload_max_mb", "abc")])).is_err());
        assert!(apply_settings_form(&current, &form(&[("upload_max_mb", "0")])).is_err());
    }
}
