//! Terminal output helpers for the relay CLI

use owo_colors::OwoColorize;

/// Check if terminal supports colors
pub fn supports_color() -> bool {
    supports_color::on(supports_color::Stream::Stdout).is_some()
}

pub fn get_banner() -> &'static str {
    r#"
  ▀█▀ ▀█▀ ▄▀▀   █▀▄ ██▀ █   ▄▀▄ ▀▄▀
   █   █  ▄██   █▀▄ █▄▄ █▄▄ █▀█  █

      Multi-sentence speech synthesis relay
"#
}

/// Print the banner, one color per line
pub fn print_banner() {
    let banner = get_banner();

    if supports_color() {
        for (i, line) in banner.lines().enumerate() {
            match i % 3 {
                0 => println!("{}", line.bright_magenta()),
                1 => println!("{}", line.magenta()),
                _ => println!("{}", line.bright_blue()),
            }
        }
    } else {
        println!("{}", banner);
    }
}

/// Print a framed list of key/value pairs under a title
pub fn print_box_kv(title: &str, content: &[(&str, String)]) {
    let width = 60;
    let label_width = content.iter().map(|(label, _)| label.len()).max().unwrap_or(0);

    println!("╔{}╗", "═".repeat(width));
    if supports_color() {
        println!("║ {} ", title.bright_cyan().bold());
    } else {
        println!("║ {} ", title);
    }
    println!("╠{}╣", "═".repeat(width));
    for (label, value) in content {
        if supports_color() {
            println!("║  {:<label_width$}  {}", label.bright_blue(), value);
        } else {
            println!("║  {:<label_width$}  {}", label, value);
        }
    }
    println!("╚{}╝", "═".repeat(width));
}

/// Print a section header
pub fn print_section(title: &str) {
    if supports_color() {
        println!("\n{}", "━".repeat(60).bright_black());
        println!("  {}", title.bright_cyan().bold());
        println!("{}", "━".repeat(60).bright_black());
    } else {
        println!("\n{}", "━".repeat(60));
        println!("  {}", title);
        println!("{}", "━".repeat(60));
    }
}

/// Print a success message
pub fn print_success(message: &str) {
    if supports_color() {
        println!("{} {}", "✓".bright_green().bold(), message.green());
    } else {
        println!("[OK] {}", message);
    }
}

/// Print an error message
pub fn print_error(message: &str) {
    if supports_color() {
        eprintln!("{} {}", "✗".bright_red().bold(), message.red());
    } else {
        eprintln!("[ERR] {}", message);
    }
}

/// Print an info message
pub fn print_info(message: &str) {
    if supports_color() {
        println!("{} {}", "ℹ".bright_blue().bold(), message.bright_white());
    } else {
        println!("[INFO] {}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_banner_not_empty() {
        assert!(get_banner().contains("relay"));
    }

    #[test]
    fn test_print_functions() {
        print_success("test");
        print_error("test");
        print_info("test");
        print_section("test");
        print_box_kv("Test", &[("key", "value".to_string())]);
    }
}
