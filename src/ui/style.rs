use console::style;
use std::fmt::Display;

/// Green bold, successful outcomes
pub fn success<D: Display>(text: D) -> String {
    style(text).green().bold().to_string()
}

/// Red bold, failed outcomes and fatal errors
pub fn failure<D: Display>(text: D) -> String {
    style(text).red().bold().to_string()
}

/// Yellow, warnings and exhausted budgets
pub fn warning<D: Display>(text: D) -> String {
    style(text).yellow().to_string()
}

/// White bold, section headers
pub fn header<D: Display>(text: D) -> String {
    style(text).white().bold().to_string()
}

/// Dim, secondary text such as timestamps
pub fn dim<D: Display>(text: D) -> String {
    style(text).dim().to_string()
}

/// Cyan, field labels and paths
pub fn label<D: Display>(text: D) -> String {
    style(text).cyan().to_string()
}

/// Cyan underlined, pull request links
pub fn url<D: Display>(text: D) -> String {
    style(text).cyan().underlined().to_string()
}
