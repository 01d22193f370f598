//! Category weights, per-hit severity and the analysis risk score.

use crate::models::Severity;

pub fn category_weight(category: &str) -> f32 {
    let c = category.to_lowercase();
    if c.contains("liability") {
        1.0
    } else if c.contains("termination") {
        0.8
    } else if c.contains("intellectual") || c == "ip" {
        0.7
    } else if c.contains("payment") {
        0.6
    } else if c.contains("confidential") {
        0.5
    } else {
        0.3
    }
}

pub fn severity(category: &str, prob: f32) -> Severity {
    let weighted = category_weight(category) * prob;
    if weighted >= 0.6 {
        Severity::High
    } else if weighted >= 0.35 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Combined probability that at least one weighted hit is a real risk, as 0..=100.
pub fn risk_score<'a, I>(hits: I) -> i64
where
    I: IntoIterator<Item = (&'a str, f32)>,
{
    let mut clean = 1.0f64;
    let mut any = false;
    for (category, prob) in hits {
        any = true;
        let p = (category_weight(category) * prob.clamp(0.0, 1.0)) as f64;
        clean *= 1.0 - p;
    }
    if !any {
        return 0;
    }
    (100.0 * (1.0 - clean)).round() as i64
}

/// Most frequent category; ties go to the one seen first.
pub fn top_category<'a, I>(categories: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for c in categories {
        match counts.iter_mut().find(|(name, _)| *name == c) {
            Some(entry) => entry.1 += 1,
            None => counts.push((c, 1)),
        }
    }
    let mut best: Option<(&str, usize)> = None;
    for (name, n) in counts {
        if best.map_or(true, |(_, b)| n > b) {
            best = Some((name, n));
        }
    }
    best.map(|(name, _)| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_follow_category_families() {
        assert_eq!(category_weight("Liability & Exclusions"), 1.0);
        assert_eq!(category_weight("Intellectual Property"), 0.7);
        assert_eq!(category_weight("Force Majeure"), 0.3);
    }

    #[test]
    fn severity_bands() {
        assert_eq!(severity("Liability & Exclusions", 0.9), Severity::High);
        assert_eq!(severity("Confidentiality", 0.9), Severity::Medium);
        assert_eq!(severity("Other", 0.9), Severity::Low);
    }

    #[test]
    fn risk_score_combines_hits() {
        assert_eq!(risk_score(Vec::<(&str, f32)>::new()), 0);
        assert_eq!(risk_score([("Liability & Exclusions", 0.5)]), 50);
        // 1 - (1 - 0.5) * (1 - 0.4) = 0.7
        assert_eq!(
            risk_score([("Liability & Exclusions", 0.5), ("Termination", 0.5)]),
            70
        );
        assert_eq!(risk_score([("Liability & Exclusions", 1.0)]), 100);
    }

    #[test]
    fn top_category_breaks_ties_by_first_seen() {
        assert_eq!(top_category(["B", "A", "A", "B"]).as_deref(), Some("B"));
        assert_eq!(top_category(["B", "A", "A"]).as_deref(), Some("A"));
        assert_eq!(top_category(Vec::<&str>::new()), None);
    }
}
