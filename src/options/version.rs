use colored::Colorize;

use crate::utils::mirror::resolve_mirror;
use crate::utils::version::MINIMUM_VERSION;

pub fn show(verbose: bool) {
    let version = env!("CARGO_PKG_VERSION");
    let name = env!("CARGO_PKG_NAME");

    println!("{} v{}", name.bright_green(), version.bright_white());
    println!("Author: {}", env!("CARGO_PKG_AUTHORS").bright_blue());

    if verbose {
        println!("Mirror: {}", resolve_mirror(None).bright_white());
        println!("Oldest installable Node.js: {}", MINIMUM_VERSION.to_string().bright_white());
    }
}
