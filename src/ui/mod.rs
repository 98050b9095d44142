//! Terminal output for kiln commands
//!
//! One `Console` value carries the interactivity decision for a whole
//! command: cliclack steps and spinners on a TTY, plain prefixed lines in
//! CI and pipes. Commands never branch on interactivity themselves.

mod theme;

pub use theme::init_theme;

use crate::error::{KilnError, KilnResult};
use console::{style, Style};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;

/// Environment variables that mark a CI runner
const CI_MARKERS: &[&str] = &[
    "CI",
    "GITHUB_ACTIONS",
    "GITLAB_CI",
    "CIRCLECI",
    "JENKINS_URL",
    "BUILDKITE",
    "TEAMCITY_VERSION",
];

/// Console output handle for one command invocation
#[derive(Debug, Clone)]
pub struct Console {
    fancy: bool,
    auto_yes: bool,
}

impl Console {
    /// Detect terminal capabilities and CI markers
    pub fn detect() -> Self {
        let tty = std::io::stdout().is_terminal() && std::io::stdin().is_terminal();
        let ci = CI_MARKERS.iter().any(|var| std::env::var(var).is_ok());
        Self {
            fancy: tty && !ci,
            auto_yes: false,
        }
    }

    /// Plain output regardless of terminal (testing, explicit CI mode)
    pub fn plain() -> Self {
        Self {
            fancy: false,
            auto_yes: false,
        }
    }

    /// Auto-approve prompts (--yes flags)
    pub fn with_auto_yes(mut self, yes: bool) -> Self {
        self.auto_yes = yes;
        self
    }

    /// Whether fancy output (spinners, step glyphs) is active
    pub fn is_fancy(&self) -> bool {
        self.fancy
    }

    /// Opening banner for a command
    pub fn intro(&self, title: &str) {
        if self.fancy {
            cliclack::intro(style(title).yellow().bold()).ok();
        } else {
            println!("{}", style(title).bold());
        }
    }

    /// Closing success line
    pub fn done(&self, message: &str) {
        if self.fancy {
            cliclack::outro(style(message).green().bold()).ok();
        } else {
            println!("+ {}", message);
        }
    }

    /// A completed step
    pub fn ok(&self, message: &str) {
        if self.fancy {
            cliclack::log::success(message).ok();
        } else {
            println!("+ {}", message);
        }
    }

    /// A completed step with a dimmed detail
    pub fn ok_detail(&self, message: &str, detail: &str) {
        if self.fancy {
            cliclack::log::success(format!("{} ({})", message, style(detail).dim())).ok();
        } else {
            println!("+ {} ({})", message, detail);
        }
    }

    /// A warning step
    pub fn warn(&self, message: &str) {
        if self.fancy {
            cliclack::log::warning(message).ok();
        } else {
            println!("! {}", message);
        }
    }

    /// A warning step with a follow-up hint
    pub fn warn_hint(&self, message: &str, hint: &str) {
        if self.fancy {
            cliclack::log::warning(format!("{} - {}", message, style(hint).dim())).ok();
        } else {
            println!("! {} - {}", message, hint);
        }
    }

    /// A failed step with detail
    pub fn fail_detail(&self, message: &str, detail: &str) {
        if self.fancy {
            cliclack::log::error(format!("{}: {}", message, style(detail).red())).ok();
        } else {
            println!("x {}: {}", message, detail);
        }
    }

    /// An informational step
    pub fn info(&self, message: &str) {
        if self.fancy {
            cliclack::log::info(message).ok();
        } else {
            println!("- {}", message);
        }
    }

    /// A name/value line
    pub fn field(&self, name: &str, value: &str) {
        if self.fancy {
            println!("  {}: {}", style(name).dim(), value);
        } else {
            println!("  {}: {}", name, value);
        }
    }

    /// A name/value line where the value carries a good/bad color
    pub fn field_status(&self, name: &str, value: &str, good: bool) {
        let value_style = if good {
            Style::new().green()
        } else {
            Style::new().yellow()
        };

        if self.fancy {
            println!("  {}: {}", style(name).dim(), value_style.apply_to(value));
        } else {
            println!("  {}: {}", name, value);
        }
    }

    /// Spinner for a long phase; plain mode logs the message once instead
    pub fn spinner(&self, message: &str) -> ProgressBar {
        if !self.fancy {
            println!("- {}", message);
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.yellow} {msg}")
                .unwrap(),
        );
        pb.set_message(message.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    }

    /// Ask for confirmation. Auto-yes approves, non-interactive mode takes
    /// the default, a TTY gets a cliclack prompt.
    pub async fn confirm(&self, message: &str, default: bool) -> KilnResult<bool> {
        if self.auto_yes {
            println!("  {} (auto-approved)", message);
            return Ok(true);
        }

        if !self.fancy {
            return Ok(default);
        }

        let message = message.to_string();
        tokio::task::spawn_blocking(move || {
            cliclack::confirm(&message)
                .initial_value(default)
                .interact()
        })
        .await
        .map_err(|e| KilnError::User(format!("Prompt task failed: {}", e)))?
        .map_err(|e| KilnError::User(format!("Prompt failed: {}", e)))
    }
}
