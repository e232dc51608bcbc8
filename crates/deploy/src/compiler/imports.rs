//! Import directives and the import graph of a source set.

use std::collections::{BTreeMap, BTreeSet};

use super::pragma::strip_comments;

/// Paths named by every `import` directive in a source file, as written.
pub fn extract_imports(content: &str) -> Vec<String> {
    let stripped = strip_comments(content);
    let mut imports = Vec::new();

    for (idx, keyword) in stripped.match_indices("import") {
        let before = stripped[..idx].chars().next_back();
        let after = stripped[idx + keyword.len()..].chars().next();
        let starts_statement = before.is_none_or(|c| c.is_whitespace() || c == ';' || c == '}');
        let keyword_ends = after.is_some_and(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '{' | '*'));
        if !(starts_statement && keyword_ends) {
            continue;
        }

        let statement = &stripped[idx + keyword.len()..];
        let Some(statement) = statement.split(';').next().filter(|_| statement.contains(';')) else {
            continue;
        };
        // Every import form carries exactly one string literal: the path.
        let Some(open) = statement.find(['"', '\'']) else {
            continue;
        };
        let quote = &statement[open..open + 1];
        let literal = &statement[open + 1..];
        if let Some(close) = literal.find(quote) {
            imports.push(literal[..close].to_string());
        }
    }

    imports
}

/// Resolve `import` as written in `importer` to a source set key.
///
/// Only `./` and `../` paths are relative to the importing file; anything else
/// is already a source key or names an external package.
pub fn resolve_import(importer: &str, import: &str) -> String {
    if !(import.starts_with("./") || import.starts_with("../")) {
        return import.to_string();
    }

    let mut parts: Vec<&str> = importer.split('/').collect();
    parts.pop();
    for segment in import.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            segment => parts.push(segment),
        }
    }
    parts.join("/")
}

/// `root` plus every file it reaches through imports.
pub(super) fn import_closure(root: &str, graph: &BTreeMap<&str, Vec<String>>) -> BTreeSet<String> {
    let mut closure = BTreeSet::new();
    let mut pending = vec![root.to_string()];

    while let Some(path) = pending.pop() {
        if !closure.insert(path.clone()) {
            continue;
        }
        if let Some(deps) = graph.get(path.as_str()) {
            pending.extend(deps.iter().cloned());
        }
    }

    closure
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_every_import_form() {
        let source = r#"
pragma solidity ^0.8.0;

import "./Plain.sol";
import './Single.sol';
import "./Aliased.sol" as Aliased;
import * as Star from "../Star.sol";
import {A, B as C} from "@openzeppelin/contracts/token/ERC20/ERC20.sol";
// import "./Commented.sol";
/* import "./Blocked.sol"; */

contract JuiceBox {
    string private reimport = "x";
}
"#;
        assert_eq!(
            extract_imports(source),
            vec![
                "./Plain.sol",
                "./Single.sol",
                "./Aliased.sol",
                "../Star.sol",
                "@openzeppelin/contracts/token/ERC20/ERC20.sol",
            ]
        );
    }

    #[test]
    fn test_resolve_import() {
        assert_eq!(resolve_import("contracts/JuiceBox.sol", "./lib/Util.sol"), "contracts/lib/Util.sol");
        assert_eq!(resolve_import("contracts/lib/Util.sol", "../Base.sol"), "contracts/Base.sol");
        assert_eq!(resolve_import("contracts/a/b/C.sol", "./../../D.sol"), "contracts/D.sol");
        assert_eq!(
            resolve_import("contracts/JuiceBox.sol", "contracts/Base.sol"),
            "contracts/Base.sol"
        );
    }

    #[test]
    fn test_import_closure_handles_cycles() {
        let graph = BTreeMap::from([
            ("a.sol", vec!["b.sol".to_string()]),
            ("b.sol", vec!["c.sol".to_string(), "a.sol".to_string()]),
            ("c.sol", vec![]),
            ("d.sol", vec![]),
        ]);

        let closure = import_closure("a.sol", &graph);
        assert_eq!(closure.into_iter().collect::<Vec<_>>(), vec!["a.sol", "b.sol", "c.sol"]);
        assert_eq!(import_closure("d.sol", &graph).len(), 1);
    }
}
