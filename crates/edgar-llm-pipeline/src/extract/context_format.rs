use chrono::NaiveDate;
use regex::Regex;
use tracing::debug;

use edgar_llm_core::Period;

/// A named handler that recognises one context-id convention.
struct FormatHandler {
    name: &'static str,
    pattern: Regex,
    build: fn(&regex::Captures<'_>) -> Option<Period>,
}

/// **Context Format Registry**
///
/// Context ids in EDGAR filings follow several conventions:
/// `C_<CIK>_<YYYYMMDD>` (instant), `C_<CIK>_<YYYYMMDD>_<YYYYMMDD>`
/// (duration), `<anything>_I<YYYYMMDD>`, `<anything>_D<YYYYMMDD>-<YYYYMMDD>`,
/// hex-prefixed variants such as `i<32 hex>_I<YYYYMMDD>`, and fully opaque
/// ids. Handlers are registered once at startup and tried in order; the
/// first one that matches wins. Opaque ids return `None` and are resolved
/// from the explicit context elements instead.
pub struct ContextFormatRegistry {
    handlers: Vec<FormatHandler>,
}

impl ContextFormatRegistry {
    pub fn new() -> Self {
        let handlers = vec![
            // C_0000789019_20200701_20210630
            FormatHandler {
                name: "C_Duration",
                pattern: Regex::new(r"^C_\d+_(\d{8})_(\d{8})$").expect("static regex"),
                build: |caps| duration(&caps[1], &caps[2]),
            },
            // C_0000789019_20200701
            FormatHandler {
                name: "C_Instant",
                pattern: Regex::new(r"^C_\d+_(\d{8})$").expect("static regex"),
                build: |caps| instant(&caps[1]),
            },
            // i<32 hex>_D20210201-20220130
            FormatHandler {
                name: "Hex_Duration",
                pattern: Regex::new(r"^i[0-9a-f]{32}_D(\d{8})-(\d{8})$").expect("static regex"),
                build: |caps| duration(&caps[1], &caps[2]),
            },
            // i<32 hex>_I20210201
            FormatHandler {
                name: "Hex_Instant",
                pattern: Regex::new(r"^i[0-9a-f]{32}_I(\d{8})$").expect("static regex"),
                build: |caps| instant(&caps[1]),
            },
            // <anything>_D20200701-20210630
            FormatHandler {
                name: "D_Duration",
                pattern: Regex::new(r"_D(\d{8})-(\d{8})").expect("static regex"),
                build: |caps| duration(&caps[1], &caps[2]),
            },
            // <anything>_I20200701
            FormatHandler {
                name: "I_Instant",
                pattern: Regex::new(r"_I(\d{8})").expect("static regex"),
                build: |caps| instant(&caps[1]),
            },
        ];
        Self { handlers }
    }

    /// Extract period information from a context id, if any registered
    /// format recognises it.
    pub fn extract_period(&self, context_id: &str) -> Option<Period> {
        for handler in &self.handlers {
            if let Some(caps) = handler.pattern.captures(context_id) {
                if let Some(period) = (handler.build)(&caps) {
                    debug!(context_id, handler = handler.name, "context format matched");
                    return Some(period);
                }
            }
        }
        None
    }

    pub fn handler_names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name).collect()
    }
}

impl Default for ContextFormatRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn date8_to_iso(digits: &str) -> Option<String> {
    let date = NaiveDate::parse_from_str(digits, "%Y%m%d").ok()?;
    Some(date.format("%Y-%m-%d").to_string())
}

fn instant(digits: &str) -> Option<Period> {
    Some(Period::Instant {
        date: date8_to_iso(digits)?,
    })
}

fn duration(start: &str, end: &str) -> Option<Period> {
    Some(Period::Duration {
        start_date: date8_to_iso(start)?,
        end_date: date8_to_iso(end)?,
    })
}
