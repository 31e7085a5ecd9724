//! Static builtin-procedure table.
//!
//! Builtins are predefined callables that are never declared in source.
//! They are consulted only after ordinary scope lookup fails for an
//! identifier in call position (followed by `(` or targeted by `CALL`).

/// One builtin procedure: name, signature and a one-line description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Builtin {
    pub name: &'static str,
    pub signature: &'static str,
    pub description: &'static str,
}

pub static BUILTINS: &[Builtin] = &[
    Builtin {
        name: "ABS",
        signature: "ABS(x FIXED|FLOAT) RETURNS(FIXED|FLOAT)",
        description: "Absolute value of a numeric expression.",
    },
    Builtin {
        name: "ARCTAN",
        signature: "ARCTAN(x FLOAT) RETURNS(FLOAT)",
        description: "Arc tangent, result in radians.",
    },
    Builtin {
        name: "COS",
        signature: "COS(x FLOAT) RETURNS(FLOAT)",
        description: "Cosine of an angle given in radians.",
    },
    Builtin {
        name: "DATE",
        signature: "DATE RETURNS(CHAR(10))",
        description: "Current calendar date as a character string.",
    },
    Builtin {
        name: "ENTIER",
        signature: "ENTIER(x FLOAT) RETURNS(FIXED)",
        description: "Largest integer not greater than the argument.",
    },
    Builtin {
        name: "EXP",
        signature: "EXP(x FLOAT) RETURNS(FLOAT)",
        description: "Exponential function e**x.",
    },
    Builtin {
        name: "LN",
        signature: "LN(x FLOAT) RETURNS(FLOAT)",
        description: "Natural logarithm.",
    },
    Builtin {
        name: "LWB",
        signature: "LWB(a ARRAY) RETURNS(FIXED)",
        description: "Lower bound of an array dimension.",
    },
    Builtin {
        name: "NOW",
        signature: "NOW RETURNS(CLOCK)",
        description: "Current time of day.",
    },
    Builtin {
        name: "ROUND",
        signature: "ROUND(x FLOAT) RETURNS(FIXED)",
        description: "Nearest integer to the argument.",
    },
    Builtin {
        name: "SIGN",
        signature: "SIGN(x FIXED|FLOAT) RETURNS(FIXED)",
        description: "Sign of the argument: -1, 0 or 1.",
    },
    Builtin {
        name: "SIN",
        signature: "SIN(x FLOAT) RETURNS(FLOAT)",
        description: "Sine of an angle given in radians.",
    },
    Builtin {
        name: "SIZEOF",
        signature: "SIZEOF(x) RETURNS(FIXED)",
        description: "Storage size of an object in bytes.",
    },
    Builtin {
        name: "SQRT",
        signature: "SQRT(x FLOAT) RETURNS(FLOAT)",
        description: "Square root.",
    },
    Builtin {
        name: "TAN",
        signature: "TAN(x FLOAT) RETURNS(FLOAT)",
        description: "Tangent of an angle given in radians.",
    },
    Builtin {
        name: "TANH",
        signature: "TANH(x FLOAT) RETURNS(FLOAT)",
        description: "Hyperbolic tangent.",
    },
    Builtin {
        name: "TOBIT",
        signature: "TOBIT(x FIXED) RETURNS(BIT)",
        description: "Reinterpret a FIXED value as a bit string.",
    },
    Builtin {
        name: "TOCHAR",
        signature: "TOCHAR(x FIXED) RETURNS(CHAR)",
        description: "Character with the given code point.",
    },
    Builtin {
        name: "TOFIXED",
        signature: "TOFIXED(x BIT|CHAR) RETURNS(FIXED)",
        description: "Convert a bit string or character to FIXED.",
    },
    Builtin {
        name: "TOFLOAT",
        signature: "TOFLOAT(x FIXED) RETURNS(FLOAT)",
        description: "Widen a FIXED value to FLOAT.",
    },
    Builtin {
        name: "UPB",
        signature: "UPB(a ARRAY) RETURNS(FIXED)",
        description: "Upper bound of an array dimension.",
    },
];

/// Look up a builtin procedure by name.
pub fn lookup(name: &str) -> Option<&'static Builtin> {
    BUILTINS
        .binary_search_by(|b| b.name.cmp(name))
        .ok()
        .map(|idx| &BUILTINS[idx])
}
