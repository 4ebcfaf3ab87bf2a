//! Explain command - explain error codes

use anyhow::{anyhow, Result};
use clap::Args;

use crate::OutputFormat;

#[derive(Args, Debug)]
pub struct ExplainArgs {
    /// Error code to explain (e.g., L002)
    pub code: String,
}

struct ErrorExplanation {
    code: &'static str,
    title: &'static str,
    description: &'static str,
    example: Option<&'static str>,
    suggestion: Option<&'static str>,
    related: &'static [&'static str],
}

const ERROR_EXPLANATIONS: &[ErrorExplanation] = &[
    // Closure lowering
    ErrorExplanation {
        code: "L001",
        title: "Ambiguous or Missing Functional Interface Method",
        description: "A lambda or method reference targets a type that does not have exactly one abstract method. \
                      Methods that restate a public member of Object and default methods do not count.",
        example: Some("interface Pair { void first(); void second(); }\nPair p = () -> {};  // two abstract methods"),
        suggestion: Some("Target an interface with a single abstract method, or add default bodies to the others."),
        related: &["L004"],
    },
    ErrorExplanation {
        code: "L002",
        title: "Invalid Capture",
        description: "The closure body uses a local that is assigned more than once, or an enclosing instance \
                      that is not reachable from the closure site (for example from a static context).",
        example: Some("int i = 0;\ni++;\nRunnable r = () -> System.out.println(i);  // i is not effectively final"),
        suggestion: Some("Copy the value into a new local that is never reassigned and capture that instead."),
        related: &[],
    },
    ErrorExplanation {
        code: "L003",
        title: "Unresolvable Method Reference",
        description: "A method reference matches no member, or several members equally well, for the parameter \
                      types of the functional interface method.",
        example: Some("Function<String, Integer> f = String::nosuch;"),
        suggestion: Some("Check the member name and its parameter types, or use a lambda with explicit argument types."),
        related: &["L004"],
    },
    ErrorExplanation {
        code: "L004",
        title: "Incompatible Arity",
        description: "The functional interface method and the closure disagree on the number of parameters, \
                      or a value-returning method is implemented by a body that yields nothing.",
        example: Some("Supplier<Integer> s = x -> 1;  // get() takes no arguments"),
        suggestion: Some("Match the parameter list of the interface method and return a value when it expects one."),
        related: &["L001", "L003"],
    },
    // Input
    ErrorExplanation {
        code: "E001",
        title: "Invalid Input",
        description: "The input file is not a resolved compilation unit. Either it is not well-formed JSON, it ends \
                      early, or a node is missing a field or carries a value of the wrong kind.",
        example: Some("{ \"name\": \"Main\", types: [] }  // object keys must be quoted"),
        suggestion: Some("Regenerate the unit with the front end instead of editing it by hand."),
        related: &[],
    },
];

pub fn run(args: ExplainArgs, format: OutputFormat, use_color: bool) -> Result<()> {
    let code = args.code.to_uppercase();

    let explanation = ERROR_EXPLANATIONS
        .iter()
        .find(|e| e.code == code)
        .ok_or_else(|| anyhow!("Unknown error code: {}", code))?;

    match format {
        OutputFormat::Text => {
            let rule = "=".repeat(code.len() + explanation.title.len() + 2);
            if use_color {
                println!(
                    "\n{}: {}\n{}",
                    console::style(&code).bold().cyan(),
                    console::style(explanation.title).bold(),
                    rule
                );
            } else {
                println!("\n{}: {}\n{}", code, explanation.title, rule);
            }

            println!("\n{}\n", explanation.description);

            if let Some(example) = explanation.example {
                if use_color {
                    println!("{}:", console::style("Example").bold());
                } else {
                    println!("Example:");
                }
                for line in example.lines() {
                    println!("  {}", line);
                }
                println!();
            }

            if let Some(suggestion) = explanation.suggestion {
                if use_color {
                    println!("{}:", console::style("Suggestion").bold().green());
                } else {
                    println!("Suggestion:");
                }
                println!("  {}\n", suggestion);
            }

            if !explanation.related.is_empty() {
                if use_color {
                    println!("{}: {}", console::style("Related").dim(), explanation.related.join(", "));
                } else {
                    println!("Related: {}", explanation.related.join(", "));
                }
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "code": explanation.code,
                "title": explanation.title,
                "description": explanation.description,
                "example": explanation.example,
                "suggestion": explanation.suggestion,
                "related": explanation.related,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_diagnostics::DiagnosticCode;

    #[test]
    fn test_every_code_is_explained() {
        for code in DiagnosticCode::ALL {
            assert!(
                ERROR_EXPLANATIONS.iter().any(|e| e.code == code.as_str()),
                "{} has no explanation",
                code
            );
        }
        for explanation in ERROR_EXPLANATIONS {
            assert!(DiagnosticCode::from_code(explanation.code).is_some());
            for related in explanation.related {
                assert!(ERROR_EXPLANATIONS.iter().any(|e| e.code == *related));
            }
        }
    }

    #[test]
    fn test_unknown_code_fails() {
        let args = ExplainArgs { code: "X999".to_string() };
        assert!(run(args, OutputFormat::Json, false).is_err());
    }
}
