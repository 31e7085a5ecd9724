//! Shared source fixtures for integration tests.

#![allow(dead_code)]

use tower_lsp::lsp_types::{Position, Url};

/// Inline PEARL programs used across the test files.
pub mod inline {
    /// A well-formed module exercising tasks, procedures and declarations.
    pub const CONTROL_MODULE: &str = "\
MODULE CONTROL;
DCL DONE SEMA GLOBAL;
WORKER: TASK;
DCL COUNT FIXED;
FOR I FROM 1 BY 1 TO 10 REPEAT
COUNT := COUNT + I;
END;
RELEASE DONE;
END;
MAIN: PROC GLOBAL;
ACTIVATE WORKER PRIO 5;
REQUEST DONE;
END;
MODEND;
";

    /// A module with an unused variable and an undeclared reference.
    pub const SLOPPY_MODULE: &str = "\
MODULE SLOPPY;
P: PROC;
DCL UNUSED FIXED;
DCL OUTPUT FIXED;
OUTPUT := MISSING + 1;
END;
MODEND;
";

    /// Conditional compilation with one branch inactive.
    pub const CONDITIONAL_MODULE: &str = "\
#define TRACE 1
MODULE COND;
P: PROC;
#ifdef TRACE
DCL T FIXED;
T := 1;
#else
this line never lexes
#endif
RETURN (T);
END;
MODEND;
";
}

/// Make a uri for an in-memory test document.
pub fn fixture_uri(name: &str) -> Url {
    Url::parse(&format!("file:///tmp/pearl-tests/{name}")).expect("valid URL")
}

/// Position of the first occurrence of `needle` in `text`.
pub fn find_position(text: &str, needle: &str) -> Position {
    let offset = text
        .find(needle)
        .unwrap_or_else(|| panic!("needle `{needle}` not found in fixture"));
    let mut line = 0u32;
    let mut column = 0u32;
    for (idx, c) in text.char_indices() {
        if idx == offset {
            break;
        }
        if c == '\n' {
            line += 1;
            column = 0;
        } else {
            column += c.len_utf16() as u32;
        }
    }
    Position::new(line, column)
}

/// Position of the `n`-th occurrence (0-based) of `needle` in `text`.
pub fn find_nth_position(text: &str, needle: &str, n: usize) -> Position {
    let mut from = 0;
    for _ in 0..n {
        let hit = text[from..]
            .find(needle)
            .unwrap_or_else(|| panic!("needle `{needle}` occurs fewer times than expected"));
        from += hit + needle.len();
    }
    let hit = text[from..]
        .find(needle)
        .unwrap_or_else(|| panic!("needle `{needle}` occurs fewer times than expected"));
    let offset = from + hit;
    find_position_at(text, offset)
}

fn find_position_at(text: &str, offset: usize) -> Position {
    let mut line = 0u32;
    let mut column = 0u32;
    for (idx, c) in text.char_indices() {
        if idx == offset {
            break;
        }
        if c == '\n' {
            line += 1;
            column = 0;
        } else {
            column += c.len_utf16() as u32;
        }
    }
    Position::new(line, column)
}
