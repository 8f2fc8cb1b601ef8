use colored::Colorize;
use serde_json::Value;

pub fn print_json(label: &str, value: &Value) {
    println!("{}", label.cyan());
    match serde_json::to_string_pretty(value) {
        Ok(pretty) => println!("{pretty}"),
        Err(_) => println!("{value}"),
    }
}

pub fn print_field(name: &str, value: impl std::fmt::Display) {
    println!("{}: {}", name.cyan(), value);
}

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}
