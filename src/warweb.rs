//! Header naming for damage columns and war-web metrics.

/// Display form of a raw damage/war-web header.
///
/// `_value` columns get a `~$` prefix, the first `_loss` / `loss_` is dropped, a bare
/// `~$loss` becomes `damage`, and underscores become spaces.
pub fn trim_header(header: &str) -> String {
    let mut header = header.to_string();
    if header.contains("_value") {
        header = format!("~${}", header.replacen("_value", "", 1));
    }
    if header.contains("_loss") {
        header = header.replacen("_loss", "", 1);
    }
    if header.contains("loss_") {
        header = header.replacen("loss_", "", 1);
    }
    if header == "~$loss" {
        header = "damage".to_string();
    }
    header.replace('_', " ")
}

/// `wars` when present, else the first header, else `wars`.
pub fn default_header(headers: &[String]) -> String {
    if headers.iter().any(|h| h == "wars") {
        return "wars".to_string();
    }
    headers.first().cloned().unwrap_or_else(|| "wars".to_string())
}

/// How a directed war-web metric reads in each direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricMeta {
    Losses,
    Consumption,
    Loot,
    Attacks,
    Wars,
    Generic,
}

impl MetricMeta {
    pub fn resolve(header: &str) -> Self {
        if header.ends_with("_loss") || header.ends_with("_loss_value") || header == "loss_value" {
            MetricMeta::Losses
        } else if header.starts_with("consume_") {
            MetricMeta::Consumption
        } else if header == "loot_value" {
            MetricMeta::Loot
        } else if header.ends_with("_attacks") || header == "attacks" {
            MetricMeta::Attacks
        } else if header.starts_with("wars_") || header.ends_with("_wars") || header == "wars" {
            MetricMeta::Wars
        } else {
            MetricMeta::Generic
        }
    }

    pub fn primary_to_row_label(self, h: &str) -> String {
        match self {
            MetricMeta::Losses => format!("{} inflicted by Compared", h),
            MetricMeta::Consumption => format!("{} consumed by Selected", h),
            MetricMeta::Loot => "Loot taken by Compared".to_string(),
            MetricMeta::Attacks => format!("{} by Selected", h),
            MetricMeta::Wars => format!("{} as attacker: Selected", h),
            MetricMeta::Generic => format!("{} (Compared → Selected)", h),
        }
    }

    pub fn row_to_primary_label(self, h: &str) -> String {
        match self {
            MetricMeta::Losses => format!("{} inflicted by Selected", h),
            MetricMeta::Consumption => format!("{} consumed by Compared", h),
            MetricMeta::Loot => "Loot taken by Selected".to_string(),
            MetricMeta::Attacks => format!("{} by Compared", h),
            MetricMeta::Wars => format!("{} as attacker: Compared", h),
            MetricMeta::Generic => format!("{} (Selected → Compared)", h),
        }
    }

    pub fn direction_note(self, h: &str) -> String {
        match self {
            MetricMeta::Losses => {
                format!("{} counts losses inflicted by each side in battles against the other.", h)
            }
            MetricMeta::Consumption => format!(
                "{} is the resources consumed by each side during battles against the other.",
                h
            ),
            MetricMeta::Loot => "loot_value is the loot taken by each side from the other.".to_string(),
            MetricMeta::Attacks => {
                format!("{} counts attacks launched by each side against the other.", h)
            }
            MetricMeta::Wars => {
                format!("{} counts wars where each side was the attacker/initiator.", h)
            }
            MetricMeta::Generic => format!(
                "{}: \"Selected\" is the value attributed to Compared coalition, \"Compared\" to the Selected coalition.",
                h
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_headers() {
        assert_eq!(trim_header("loss_value"), "damage");
        assert_eq!(trim_header("infra_loss_value"), "~$infra");
        assert_eq!(trim_header("soldier_loss"), "soldier");
        assert_eq!(trim_header("loss_money"), "money");
        assert_eq!(trim_header("wars_won"), "wars won");
        assert_eq!(trim_header("consume_gas_value"), "~$consume gas");
    }

    #[test]
    fn direction_note_follows_metric_kind() {
        let note = |h: &str| MetricMeta::resolve(h).direction_note(h);
        assert_eq!(note("wars"), "wars counts wars where each side was the attacker/initiator.");
        assert_eq!(note("loot_value"), "loot_value is the loot taken by each side from the other.");
        assert!(note("soldier_loss").starts_with("soldier_loss counts losses inflicted"));
        assert!(note("beige").starts_with("beige: \"Selected\""));
    }

    #[test]
    fn default_prefers_wars() {
        let headers = vec!["attacks".to_string(), "wars".to_string()];
        assert_eq!(default_header(&headers), "wars");
        assert_eq!(default_header(&headers[..1]), "attacks");
        assert_eq!(default_header(&[]), "wars");
    }

    #[test]
    fn meta_rules_in_priority_order() {
        assert_eq!(MetricMeta::resolve("soldier_loss"), MetricMeta::Losses);
        assert_eq!(MetricMeta::resolve("infra_loss_value"), MetricMeta::Losses);
        assert_eq!(MetricMeta::resolve("consume_gas"), MetricMeta::Consumption);
        assert_eq!(MetricMeta::resolve("loot_value"), MetricMeta::Loot);
        assert_eq!(MetricMeta::resolve("ground_attacks"), MetricMeta::Attacks);
        assert_eq!(MetricMeta::resolve("wars_won"), MetricMeta::Wars);
        assert_eq!(MetricMeta::resolve("beige"), MetricMeta::Generic);
        assert_eq!(
            MetricMeta::Wars.primary_to_row_label("wars"),
            "wars as attacker: Selected"
        );
    }
}
