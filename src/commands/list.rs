//! List commands implementation

use crate::programmers;

/// List all programmers compiled into this binary
pub fn list_programmers() {
    println!("Supported programmers:");
    println!();
    for p in programmers::available_programmers() {
        if p.aliases.is_empty() {
            println!("  {:12} - {}", p.name, p.description);
        } else {
            println!(
                "  {:12} - {} (aliases: {})",
                p.name,
                p.description,
                p.aliases.join(", ")
            );
        }
    }
}
