//! Process-wide trace of generated conversion plans.
//!
//! Generated closures have no source text to point a debugger at, so each
//! generation records a one-line-per-field description of its plan under a
//! collision-free name. Purely diagnostic; callers opt out through the
//! generation options.

use std::collections::HashMap;
use std::sync::{LazyLock, Mutex};

static PLANS: LazyLock<Mutex<HashMap<String, Vec<String>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Records a generated plan under a collision-free name and returns that
/// name. A second generation with the same function name gets a numeric
/// suffix (`<recast generated structure Pair_int-2>`).
pub fn record_plan(kind: &str, fn_name: &str, lines: Vec<String>) -> String {
    let mut plans = PLANS.lock().expect("plan trace lock poisoned");
    let mut name = format!("<recast generated {kind} {fn_name}>");
    let mut count = 1;
    while plans.contains_key(&name) {
        count += 1;
        name = format!("<recast generated {kind} {fn_name}-{count}>");
    }
    plans.insert(name.clone(), lines);
    name
}

/// The recorded plan for `name`, if any.
pub fn plan_lines(name: &str) -> Option<Vec<String>> {
    let plans = PLANS.lock().expect("plan trace lock poisoned");
    plans.get(name).cloned()
}

/// All recorded plan names, sorted for deterministic inspection.
pub fn plan_names() -> Vec<String> {
    let plans = PLANS.lock().expect("plan trace lock poisoned");
    let mut names: Vec<_> = plans.keys().cloned().collect();
    names.sort();
    names
}
