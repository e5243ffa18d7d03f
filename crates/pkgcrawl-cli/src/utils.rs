use std::{
    fmt::Display,
    sync::{LazyLock, RwLock},
};

use nu_ansi_term::Color;

pub static COLOR: LazyLock<RwLock<bool>> = LazyLock::new(|| RwLock::new(true));
pub static PROGRESS: LazyLock<RwLock<bool>> = LazyLock::new(|| RwLock::new(true));

pub fn color_enabled() -> bool {
    *COLOR.read().unwrap_or_else(|p| p.into_inner())
}

pub fn progress_enabled() -> bool {
    *PROGRESS.read().unwrap_or_else(|p| p.into_inner())
}

pub fn set_flag(flag: &RwLock<bool>, value: bool) {
    *flag.write().unwrap_or_else(|p| p.into_inner()) = value;
}

pub struct Colored<T: Display>(pub Color, pub T);

impl<T: Display> Display for Colored<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if color_enabled() {
            write!(f, "{}", self.0.prefix())?;
            self.1.fmt(f)?;
            write!(f, "{}", self.0.suffix())
        } else {
            self.1.fmt(f)
        }
    }
}

/// `1 package`, `3 libraries`.
pub fn count_of(count: usize, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("{count} {singular}")
    } else {
        format!("{count} {plural}")
    }
}

#[cfg(test)]
mod tests {
    use nu_ansi_term::Color::Red;

    use super::*;

    #[test]
    fn test_count_of() {
        assert_eq!(count_of(1, "package", "packages"), "1 package");
        assert_eq!(count_of(0, "library", "libraries"), "0 libraries");
    }

    #[test]
    fn test_colored_respects_flag() {
        set_flag(&COLOR, false);
        assert_eq!(Colored(Red, "broken").to_string(), "broken");
        set_flag(&COLOR, true);
        assert!(Colored(Red, "broken").to_string().contains("broken"));
    }
}
