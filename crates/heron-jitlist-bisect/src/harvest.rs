//! Reading compiled function names out of a debug run's output.

use std::sync::LazyLock;

use regex::Regex;

static COMPILE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r" -- Compiling ([^ ]+) @ 0x[0-9a-f]+\s*$").expect("valid regex")
});

/// Qualified names of every function the run compiled, in first-seen order.
pub fn compiled_names(output: &str) -> Vec<String> {
    let mut names = Vec::new();
    for line in output.lines() {
        if let Some(captures) = COMPILE_LINE.captures(line) {
            let name = &captures[1];
            if !names.iter().any(|seen| seen == name) {
                names.push(name.to_owned());
            }
        }
    }
    names
}
