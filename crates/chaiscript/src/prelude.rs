//! The script prelude evaluated at engine construction.
//!
//! Builds the user-facing printing and container helpers on top of the
//! bootstrap registrations. The guarded `to_string` overloads rely on
//! `call_exists`, and `var`-assignments inside rely on `clone`, so the
//! prelude must run after bootstrap.

pub(crate) const PRELUDE: &str = r#"
def to_string(x) : call_exists(first, x) && call_exists(second, x) {
    "<" + x.first.to_string() + ", " + x.second.to_string() + ">"
}
def to_string(x) : call_exists(range, x) {
    "[" + x.join(", ") + "]"
}
def to_string(x) {
    x.internal_to_string()
}
def puts(x) {
    print_string(x.to_string())
}
def print(x) {
    println_string(x.to_string())
}
def for_each(container, func) {
    var r = range(container)
    while (!r.empty()) {
        func(r.front())
        r.pop_front()
    }
}
def map(container, func) {
    var retval = Vector()
    var r = range(container)
    while (!r.empty()) {
        retval.push_back(func(r.front()))
        r.pop_front()
    }
    retval
}
def reduce(container, func, initial) {
    var retval = initial
    var r = range(container)
    while (!r.empty()) {
        retval = func(r.front(), retval)
        r.pop_front()
    }
    retval
}
def join(container, delim) {
    var retval = ""
    var r = range(container)
    if (!r.empty()) {
        retval += to_string(r.front())
        r.pop_front()
        while (!r.empty()) {
            retval += delim
            retval += to_string(r.front())
            r.pop_front()
        }
    }
    retval
}
"#;
