use chrono::{DateTime, Utc};

#[cfg(feature = "colors")]
use owo_colors::OwoColorize;

// Provide a no-op color shim when "colors" feature is disabled
#[cfg(not(feature = "colors"))]
pub mod color_shim {
    use std::fmt::{self, Display, Formatter};

    #[derive(Clone)]
    pub struct Plain(pub String);

    impl Display for Plain {
        fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
            f.write_str(&self.0)
        }
    }

    pub trait ColorizeShim {
        fn as_str(&self) -> &str;

        fn bright_black(&self) -> Plain {
            Plain(self.as_str().to_string())
        }
        fn green(&self) -> Plain {
            Plain(self.as_str().to_string())
        }
        fn yellow(&self) -> Plain {
            Plain(self.as_str().to_string())
        }
        fn cyan(&self) -> Plain {
            Plain(self.as_str().to_string())
        }
        fn red(&self) -> Plain {
            Plain(self.as_str().to_string())
        }
        fn bold(&self) -> Plain {
            Plain(self.as_str().to_string())
        }
        fn dimmed(&self) -> Plain {
            Plain(self.as_str().to_string())
        }
    }

    impl ColorizeShim for &str {
        fn as_str(&self) -> &str {
            self
        }
    }
    impl ColorizeShim for String {
        fn as_str(&self) -> &str {
            self.as_str()
        }
    }
    impl ColorizeShim for Plain {
        fn as_str(&self) -> &str {
            &self.0
        }
    }
}

#[cfg(not(feature = "colors"))]
use color_shim::ColorizeShim as OwoColorize;

use crate::models::{ApiKey, Response};
use crate::service::RankedKey;
use crate::utils::{TOP_KEYS, format_age};

fn colorize_score(score: f64) -> String {
    if score >= 30.0 {
        format!("{score:>5.1}").green().bold().to_string()
    } else if score > 0.0 {
        format!("{score:>5.1}").yellow().to_string()
    } else {
        format!("{score:>5.1}").dimmed().to_string()
    }
}

/// One line of ranked output: score, name, preview, last use
pub fn format_ranked_line(ranked: &RankedKey, now: DateTime<Utc>) -> String {
    format!(
        "{} {} {} {}",
        colorize_score(ranked.score()),
        ranked.key.name.bold(),
        ranked.key.masked().cyan(),
        format!("(used {})", format_age(ranked.key.last_used, now)).bright_black()
    )
}

pub fn format_key_line(key: &ApiKey, now: DateTime<Utc>) -> String {
    format!(
        "{} {} {} {}",
        key.id.as_str().bright_black(),
        key.name.bold(),
        key.masked().cyan(),
        format!("(added {})", format_age(key.created_at, now)).bright_black()
    )
}

pub fn print_ranked(ranked: &[RankedKey], all: bool, now: DateTime<Utc>) {
    if ranked.is_empty() {
        println!("{}", "[no keys stored]".dimmed());
        return;
    }
    println!("{}", "Top keys".bold());
    for r in ranked.iter().take(TOP_KEYS) {
        println!("  {}", format_ranked_line(r, now));
    }
    if all {
        println!("{}", "All keys".bold());
        for r in ranked {
            println!("  {}", format_ranked_line(r, now));
        }
    }
}

pub fn print_keys(keys: &[ApiKey], now: DateTime<Utc>) {
    if keys.is_empty() {
        println!("{}", "[no keys stored]".dimmed());
        return;
    }
    for key in keys {
        println!("{}", format_key_line(key, now));
    }
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "error:".red().bold(), message);
}

pub fn print_json_output(response: &Response) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(response)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::ScoreBreakdown;
    use chrono::TimeDelta;

    #[test]
    fn ranked_line_never_shows_full_secret() {
        let now = Utc::now();
        let ranked = RankedKey {
            key: ApiKey::new("Stripe", "sk_live_0123456789abcdef", now - TimeDelta::hours(2)),
            breakdown: ScoreBreakdown {
                fresh: 10.0,
                usage: 4.0,
                recency: 20.5,
            },
        };
        let line = format_ranked_line(&ranked, now);
        assert!(line.contains("Stripe"));
        assert!(line.contains("sk_live_"));
        assert!(!line.contains("0123456789abcdef"));
        assert!(line.contains("34.5"));
        assert!(line.contains("2h"));
    }
}
