//! Sample programs shipped with the interpreter.

/// Calls a function that prints `42` and a newline three times
pub const PRINT_NUM_THREE_TIMES: &str = include_str!("../resources/print_num_three_times.lasm");

/// Prints the first ten Fibonacci numbers, one per line
pub const FIBONACCI: &str = include_str!("../resources/fibonacci.lasm");

pub const ALL: [(&str, &str); 2] = [("printnum", PRINT_NUM_THREE_TIMES), ("fib", FIBONACCI)];

pub fn by_name(name: &str) -> Option<&'static str> {
    ALL.iter()
        .find(|(sample, _)| *sample == name)
        .map(|(_, source)| *source)
}
