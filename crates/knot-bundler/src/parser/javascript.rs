//! Dependency scanner for JavaScript sources.
//!
//! Not a full parser: a comment/string/regex-aware scanner that recognizes
//! the dependency-bearing constructs (`require()`, `import` statements and
//! expressions, `export` forms) and records their spans for later
//! splicing. ESM forms are lowered to require-style bindings through the
//! dependency's rewrite prefix/suffix; local export declarations become
//! static replacements.

use knot_graph::{Dependency, DependencyKind, Replacement, ReplacementSpan};

use super::{ParseResult, Parser};

/// Keywords after which a `/` starts a regex literal, not division.
const OPERATOR_KEYWORDS: &[&str] = &[
    "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "do", "else", "case",
    "yield", "await", "throw",
];

/// Scanner-based JavaScript parser.
///
/// Options (all booleans, default `true`): `requires`, `imports`,
/// `dynamic_imports`.
#[derive(Debug)]
pub struct JavascriptParser {
    parse_requires: bool,
    parse_imports: bool,
    parse_dynamic_imports: bool,
}

impl JavascriptParser {
    pub fn new(options: &serde_json::Value) -> Self {
        let flag = |key: &str, default: bool| {
            options
                .get(key)
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(default)
        };
        Self {
            parse_requires: flag("requires", true),
            parse_imports: flag("imports", true),
            parse_dynamic_imports: flag("dynamic_imports", true),
        }
    }
}

impl Default for JavascriptParser {
    fn default() -> Self {
        Self::new(&serde_json::Value::Null)
    }
}

impl Parser for JavascriptParser {
    fn parse(&self, source: &str) -> std::result::Result<ParseResult, String> {
        let mut scanner = Scanner {
            src: source,
            bytes: source.as_bytes(),
            pos: 0,
            order: 0,
            prev_value: false,
            prev_dot: false,
            esm: false,
            directive_strict: false,
            exported: Vec::new(),
            result: ParseResult::default(),
            options: self,
        };
        scanner.run();
        Ok(scanner.finish())
    }
}

struct Scanner<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    order: u32,
    /// Last significant token was value-like (decides regex vs division).
    prev_value: bool,
    /// Last significant token was `.` (member access guard).
    prev_dot: bool,
    esm: bool,
    directive_strict: bool,
    exported: Vec<String>,
    result: ParseResult,
    options: &'a JavascriptParser,
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b'$'
}

fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

impl<'a> Scanner<'a> {
    fn run(&mut self) {
        self.detect_strict_directive();

        while self.pos < self.bytes.len() {
            self.skip_ws_and_comments();
            if self.pos >= self.bytes.len() {
                break;
            }
            self.scan_token();
        }
    }

    /// Consume one token, dispatching to the construct handlers.
    fn scan_token(&mut self) {
        let Some(&c) = self.bytes.get(self.pos) else {
            return;
        };
        let was_dot = self.prev_dot;
        self.prev_dot = false;
        match c {
            b'\'' | b'"' => {
                self.skip_string();
                self.prev_value = true;
            }
            b'`' => {
                self.skip_template();
                self.prev_value = true;
            }
            b'/' => {
                if self.prev_value {
                    self.pos += 1;
                    self.prev_value = false;
                } else {
                    self.skip_regex();
                    self.prev_value = true;
                }
            }
            b'0'..=b'9' => {
                self.pos += 1;
                while self
                    .bytes
                    .get(self.pos)
                    .is_some_and(|&b| is_ident_char(b) || b == b'.')
                {
                    self.pos += 1;
                }
                self.prev_value = true;
            }
            b')' | b']' => {
                self.pos += 1;
                self.prev_value = true;
            }
            b'.' => {
                self.pos += 1;
                self.prev_dot = true;
                self.prev_value = false;
            }
            c if is_ident_start(c) => self.handle_word(was_dot),
            _ => {
                self.pos += 1;
                self.prev_value = false;
            }
        }
    }

    fn finish(mut self) -> ParseResult {
        if self.esm {
            let end = self.src.len() as u32;
            self.result.replacements.push(Replacement::new(
                ReplacementSpan::new(end, end),
                "\nexports.__esModule = true;",
            ));
            self.result.build_meta.uses_exports = true;
        }
        self.result.build_meta.strict = self.directive_strict || self.esm;
        self.result.build_meta.exports = self.exported;
        self.result
    }

    // --- low-level scanning -------------------------------------------------

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_ws_and_comments(&mut self) {
        loop {
            while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
                self.pos += 1;
            }
            match (self.peek(), self.bytes.get(self.pos + 1).copied()) {
                (Some(b'/'), Some(b'/')) => {
                    while self.peek().is_some_and(|b| b != b'\n') {
                        self.pos += 1;
                    }
                }
                (Some(b'/'), Some(b'*')) => {
                    self.pos += 2;
                    while self.pos < self.bytes.len() {
                        if self.bytes[self.pos] == b'*'
                            && self.bytes.get(self.pos + 1) == Some(&b'/')
                        {
                            self.pos += 2;
                            break;
                        }
                        self.pos += 1;
                    }
                }
                _ => return,
            }
        }
    }

    /// At a quote: consume the literal and return its raw content.
    fn read_string(&mut self) -> Option<String> {
        let quote = self.peek()?;
        if quote != b'\'' && quote != b'"' {
            return None;
        }
        let content_start = self.pos + 1;
        let mut i = content_start;
        while i < self.bytes.len() {
            match self.bytes[i] {
                b'\\' => i += 2,
                c if c == quote => {
                    let content = self.src[content_start..i].to_string();
                    self.pos = i + 1;
                    return Some(content);
                }
                _ => i += 1,
            }
        }
        self.pos = self.bytes.len();
        None
    }

    fn skip_string(&mut self) {
        let _ = self.read_string();
    }

    /// At a backtick: consume the template, descending into `${}`.
    fn skip_template(&mut self) {
        self.pos += 1;
        while self.pos < self.bytes.len() {
            match self.bytes[self.pos] {
                b'\\' => self.pos += 2,
                b'`' => {
                    self.pos += 1;
                    return;
                }
                b'$' if self.bytes.get(self.pos + 1) == Some(&b'{') => {
                    self.pos += 2;
                    self.skip_template_expr();
                }
                _ => self.pos += 1,
            }
        }
    }

    /// Scan a `${}` hole with normal token handling, so dependencies
    /// inside template expressions are still discovered.
    fn skip_template_expr(&mut self) {
        let mut depth = 1usize;
        while self.pos < self.bytes.len() && depth > 0 {
            self.skip_ws_and_comments();
            match self.peek() {
                Some(b'{') => {
                    depth += 1;
                    self.pos += 1;
                    self.prev_value = false;
                }
                Some(b'}') => {
                    depth -= 1;
                    self.pos += 1;
                }
                Some(_) => self.scan_token(),
                None => return,
            }
        }
    }

    /// At a `/` known to start a regex literal.
    fn skip_regex(&mut self) {
        self.pos += 1;
        let mut in_class = false;
        while self.pos < self.bytes.len() {
            match self.bytes[self.pos] {
                b'\\' => self.pos += 2,
                b'[' => {
                    in_class = true;
                    self.pos += 1;
                }
                b']' => {
                    in_class = false;
                    self.pos += 1;
                }
                b'/' if !in_class => {
                    self.pos += 1;
                    break;
                }
                b'\n' => break,
                _ => self.pos += 1,
            }
        }
        while self.peek().is_some_and(is_ident_char) {
            self.pos += 1;
        }
    }

    /// At an identifier start: consume and return the word.
    fn read_word(&mut self) -> &'a str {
        let src = self.src;
        let start = self.pos;
        while self.peek().is_some_and(is_ident_char) {
            self.pos += 1;
        }
        &src[start..self.pos]
    }

    /// Consume the next word if it equals `expected`.
    fn eat_word(&mut self, expected: &str) -> bool {
        let save = self.pos;
        self.skip_ws_and_comments();
        if self.peek().is_some_and(is_ident_start) && self.read_word() == expected {
            return true;
        }
        self.pos = save;
        false
    }

    fn next_dependency_order(&mut self) -> u32 {
        let order = self.order;
        self.order += 1;
        order
    }

    // --- directive prologue -------------------------------------------------

    fn detect_strict_directive(&mut self) {
        let save = self.pos;
        self.skip_ws_and_comments();
        if let Some(content) = self.read_string() {
            if content == "use strict" {
                self.directive_strict = true;
            }
        }
        self.pos = save;
    }

    // --- construct handlers -------------------------------------------------

    fn handle_word(&mut self, was_dot: bool) {
        let start = self.pos;
        let word = self.read_word();
        match word {
            "require" if self.options.parse_requires && !was_dot => self.scan_require(start),
            "import" if !was_dot => self.scan_import(start),
            "export" if !was_dot => self.scan_export(start),
            "module" => {
                let save = self.pos;
                self.skip_ws_and_comments();
                if self.peek() == Some(b'.') {
                    self.result.build_meta.uses_module = true;
                }
                self.pos = save;
                self.prev_value = true;
            }
            "exports" if !was_dot => {
                let save = self.pos;
                self.skip_ws_and_comments();
                if matches!(self.peek(), Some(b'.') | Some(b'[') | Some(b'=')) {
                    self.result.build_meta.uses_exports = true;
                }
                self.pos = save;
                self.prev_value = true;
            }
            w if OPERATOR_KEYWORDS.contains(&w) => self.prev_value = false,
            _ => self.prev_value = true,
        }
    }

    fn scan_require(&mut self, start: usize) {
        let save = self.pos;
        self.skip_ws_and_comments();
        if self.peek() != Some(b'(') {
            self.pos = save;
            self.prev_value = true;
            return;
        }
        self.pos += 1;
        self.skip_ws_and_comments();
        let Some(request) = self.read_string() else {
            // Not a literal request; leave the arguments to the main loop.
            self.pos = save;
            self.prev_value = true;
            return;
        };
        self.skip_ws_and_comments();
        if self.peek() != Some(b')') {
            self.pos = save;
            self.prev_value = true;
            return;
        }
        self.pos += 1;

        let order = self.next_dependency_order();
        self.result.dependencies.push(
            Dependency::new(request, DependencyKind::CjsRequire, order)
                .with_span(ReplacementSpan::new(start as u32, self.pos as u32)),
        );
        self.prev_value = true;
    }

    fn scan_import(&mut self, start: usize) {
        let save = self.pos;
        self.skip_ws_and_comments();
        match self.peek() {
            Some(b'(') => {
                if !self.options.parse_dynamic_imports || !self.scan_dynamic_import(start) {
                    self.pos = save;
                }
                self.prev_value = true;
            }
            Some(b'.') => {
                // import.meta - not a dependency.
                self.pos = save;
                self.prev_value = true;
            }
            _ => {
                self.pos = save;
                if !self.options.parse_imports || !self.scan_import_statement(start) {
                    self.pos = save;
                    self.prev_value = true;
                }
            }
        }
    }

    fn scan_dynamic_import(&mut self, start: usize) -> bool {
        // Caller verified `(`.
        self.pos += 1;
        self.skip_ws_and_comments();
        let Some(request) = self.read_string() else {
            return false;
        };
        self.skip_ws_and_comments();
        if self.peek() != Some(b')') {
            return false;
        }
        self.pos += 1;

        let order = self.next_dependency_order();
        self.result.dependencies.push(
            Dependency::new(request, DependencyKind::DynamicImport, order)
                .with_span(ReplacementSpan::new(start as u32, self.pos as u32))
                .with_rewrite("Promise.resolve().then(function() { return ", "; })"),
        );
        true
    }

    fn scan_import_statement(&mut self, start: usize) -> bool {
        self.skip_ws_and_comments();

        // `import "specifier";`
        if matches!(self.peek(), Some(b'\'') | Some(b'"')) {
            let Some(request) = self.read_string() else {
                return false;
            };
            self.push_esm_import(request, start, String::new(), String::new());
            return true;
        }

        let mut default_name: Option<String> = None;
        let mut namespace_name: Option<String> = None;
        let mut named: Vec<(String, String)> = Vec::new();

        loop {
            self.skip_ws_and_comments();
            match self.peek() {
                Some(b'*') => {
                    self.pos += 1;
                    if !self.eat_word("as") {
                        return false;
                    }
                    self.skip_ws_and_comments();
                    if !self.peek().is_some_and(is_ident_start) {
                        return false;
                    }
                    namespace_name = Some(self.read_word().to_string());
                }
                Some(b'{') => {
                    let Some(items) = self.read_named_list() else {
                        return false;
                    };
                    named = items;
                }
                Some(b) if is_ident_start(b) => {
                    default_name = Some(self.read_word().to_string());
                }
                _ => return false,
            }
            self.skip_ws_and_comments();
            if self.peek() == Some(b',') {
                self.pos += 1;
            } else {
                break;
            }
        }

        if !self.eat_word("from") {
            return false;
        }
        self.skip_ws_and_comments();
        let Some(request) = self.read_string() else {
            return false;
        };

        let order_for_tmp = self.order;
        let (prefix, suffix) =
            import_bindings(default_name, namespace_name, &named, order_for_tmp);
        self.push_esm_import(request, start, prefix, suffix);
        true
    }

    fn push_esm_import(&mut self, request: String, start: usize, prefix: String, suffix: String) {
        self.esm = true;
        let order = self.next_dependency_order();
        self.result.dependencies.push(
            Dependency::new(request, DependencyKind::EsmImport, order)
                .with_span(ReplacementSpan::new(start as u32, self.pos as u32))
                .with_rewrite(prefix, suffix),
        );
        self.prev_value = false;
    }

    /// At `{`: read `{ a, b as c }` into `(first, second)` name pairs.
    fn read_named_list(&mut self) -> Option<Vec<(String, String)>> {
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_ws_and_comments();
            match self.peek() {
                Some(b'}') => {
                    self.pos += 1;
                    return Some(items);
                }
                Some(b) if is_ident_start(b) => {
                    let first = self.read_word().to_string();
                    let second = if self.eat_word("as") {
                        self.skip_ws_and_comments();
                        if !self.peek().is_some_and(is_ident_start) {
                            return None;
                        }
                        self.read_word().to_string()
                    } else {
                        first.clone()
                    };
                    items.push((first, second));
                    self.skip_ws_and_comments();
                    match self.peek() {
                        Some(b',') => self.pos += 1,
                        Some(b'}') => {}
                        _ => return None,
                    }
                }
                _ => return None,
            }
        }
    }

    fn scan_export(&mut self, start: usize) {
        self.esm = true;
        let save = self.pos;
        self.skip_ws_and_comments();

        match self.peek() {
            Some(b'*') => {
                if !self.scan_export_star(start) {
                    self.pos = save;
                    self.prev_value = true;
                }
            }
            Some(b'{') => {
                if !self.scan_export_braces(start) {
                    self.pos = save;
                    self.prev_value = true;
                }
            }
            Some(b) if is_ident_start(b) => {
                let kw_start = self.pos;
                let word = self.read_word().to_string();
                if word == "default" {
                    self.result.replacements.push(Replacement::new(
                        ReplacementSpan::new(start as u32, self.pos as u32),
                        "exports.default =",
                    ));
                    self.exported.push("default".into());
                    self.prev_value = false;
                } else if matches!(
                    word.as_str(),
                    "const" | "let" | "var" | "function" | "class" | "async"
                ) {
                    self.scan_export_declaration(start, kw_start, &word);
                } else {
                    self.pos = save;
                    self.prev_value = true;
                }
            }
            _ => {
                self.pos = save;
                self.prev_value = true;
            }
        }
    }

    fn scan_export_star(&mut self, start: usize) -> bool {
        // At `*`.
        self.pos += 1;
        let alias = if self.eat_word("as") {
            self.skip_ws_and_comments();
            if !self.peek().is_some_and(is_ident_start) {
                return false;
            }
            Some(self.read_word().to_string())
        } else {
            None
        };
        if !self.eat_word("from") {
            return false;
        }
        self.skip_ws_and_comments();
        let Some(request) = self.read_string() else {
            return false;
        };

        let (prefix, suffix) = match &alias {
            Some(name) => {
                self.exported.push(name.clone());
                (format!("exports.{name} = "), String::new())
            }
            None => (String::from("Object.assign(exports, "), String::from(")")),
        };

        let order = self.next_dependency_order();
        self.result.dependencies.push(
            Dependency::new(request, DependencyKind::EsmExportFrom, order)
                .with_span(ReplacementSpan::new(start as u32, self.pos as u32))
                .with_rewrite(prefix, suffix),
        );
        self.prev_value = false;
        true
    }

    fn scan_export_braces(&mut self, start: usize) -> bool {
        let Some(items) = self.read_named_list() else {
            return false;
        };

        let after_list = self.pos;
        if self.eat_word("from") {
            // `export { a, b as c } from "m"` - (source, exported) pairs.
            self.skip_ws_and_comments();
            let Some(request) = self.read_string() else {
                return false;
            };
            let order = self.next_dependency_order();
            let mut pattern = Vec::new();
            let mut assignments = String::new();
            for (index, (source, exported)) in items.iter().enumerate() {
                let tmp = format!("__knot_reexport_{order}_{index}__");
                pattern.push(format!("{source}: {tmp}"));
                assignments.push_str(&format!("; exports.{exported} = {tmp}"));
                self.exported.push(exported.clone());
            }
            let prefix = format!("var {{ {} }} = ", pattern.join(", "));
            self.result.dependencies.push(
                Dependency::new(request, DependencyKind::EsmExportFrom, order)
                    .with_span(ReplacementSpan::new(start as u32, self.pos as u32))
                    .with_rewrite(prefix, assignments),
            );
        } else {
            // `export { a, b as c }` - (local, exported) pairs.
            self.pos = after_list;
            let text = items
                .iter()
                .map(|(local, exported)| {
                    self.exported.push(exported.clone());
                    format!("exports.{exported} = {local};")
                })
                .collect::<Vec<_>>()
                .join(" ");
            self.result.replacements.push(Replacement::new(
                ReplacementSpan::new(start as u32, after_list as u32),
                text,
            ));
        }
        self.prev_value = false;
        true
    }

    fn scan_export_declaration(&mut self, start: usize, kw_start: usize, keyword: &str) {
        // Strip the `export ` keyword; the declaration itself stays.
        self.result.replacements.push(Replacement::new(
            ReplacementSpan::new(start as u32, kw_start as u32),
            "",
        ));

        let mut decl = keyword.to_string();
        if decl == "async" {
            if !self.eat_word("function") {
                return;
            }
            decl = String::from("function");
        }
        if decl == "function" && {
            self.skip_ws_and_comments();
            self.peek() == Some(b'*')
        } {
            self.pos += 1;
        }
        self.skip_ws_and_comments();
        if !self.peek().is_some_and(is_ident_start) {
            // Destructuring or anonymous declaration; nothing to re-export.
            return;
        }
        let name = self.read_word().to_string();
        let end = self.src.len() as u32;
        self.result.replacements.push(Replacement::new(
            ReplacementSpan::new(end, end),
            format!("\nexports.{name} = {name};"),
        ));
        self.exported.push(name);
        self.prev_value = false;
    }
}

/// Build the rewrite prefix/suffix for an import clause.
fn import_bindings(
    default_name: Option<String>,
    namespace_name: Option<String>,
    named: &[(String, String)],
    order: u32,
) -> (String, String) {
    let destructure = |items: &[(String, String)]| {
        let fields = items
            .iter()
            .map(|(imported, local)| {
                if imported == local {
                    local.clone()
                } else {
                    format!("{imported}: {local}")
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!("var {{ {fields} }} = ")
    };

    match (default_name, namespace_name, named.is_empty()) {
        (None, Some(ns), true) => (format!("var {ns} = "), String::new()),
        (None, None, false) => (destructure(named), String::new()),
        (Some(d), ns, named_empty) => {
            let tmp = format!("__knot_import_{order}__");
            let mut suffix = format!("; var {d} = __knot_require__.n({tmp})()");
            if let Some(ns) = ns {
                suffix.push_str(&format!("; var {ns} = {tmp}"));
            }
            if !named_empty {
                let fields = named
                    .iter()
                    .map(|(imported, local)| {
                        if imported == local {
                            local.clone()
                        } else {
                            format!("{imported}: {local}")
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                suffix.push_str(&format!("; var {{ {fields} }} = {tmp}"));
            }
            (format!("var {tmp} = "), suffix)
        }
        // Bare `import from "x"` clause - treated as side-effect only.
        (None, None, true) => (String::new(), String::new()),
        (None, Some(ns), false) => {
            // `import * as ns, { a } from` is invalid syntax; keep the
            // namespace binding and ignore the named part.
            (format!("var {ns} = "), String::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn parse(source: &str) -> ParseResult {
        JavascriptParser::default().parse(source).unwrap()
    }

    #[test]
    fn finds_require_calls_in_order() {
        let result = parse(r#"const b = require("./b"); const c = require('./c');"#);
        let requests: Vec<_> = result
            .dependencies
            .iter()
            .map(|d| (d.request.as_str(), d.order))
            .collect();
        assert_eq!(requests, vec![("./b", 0), ("./c", 1)]);
        assert_eq!(result.dependencies[0].kind, DependencyKind::CjsRequire);

        // Span covers the whole call expression.
        let span = result.dependencies[0].span.unwrap();
        let source = r#"const b = require("./b"); const c = require('./c');"#;
        assert_eq!(
            &source[span.start as usize..span.end as usize],
            r#"require("./b")"#
        );
    }

    #[test]
    fn ignores_requires_in_strings_and_comments() {
        let result = parse(
            r#"
            // require("./commented")
            /* require("./blocked") */
            const s = "require('./stringed')";
            const t = `require("./templated")`;
            "#,
        );
        assert!(result.dependencies.is_empty());
    }

    #[test]
    fn member_access_require_is_not_a_dependency() {
        let result = parse(r#"cjs.require("./not-a-dep"); require("./real");"#);
        assert_eq!(result.dependencies.len(), 1);
        assert_eq!(result.dependencies[0].request, "./real");
    }

    #[test]
    fn non_literal_require_is_skipped() {
        let result = parse(r#"require(path); require("./literal");"#);
        assert_eq!(result.dependencies.len(), 1);
        assert_eq!(result.dependencies[0].request, "./literal");
    }

    #[test]
    fn regex_literal_with_quote_does_not_derail_scanning() {
        let result = parse(r#"var re = /["']/; require("./after-regex");"#);
        assert_eq!(result.dependencies.len(), 1);
        assert_eq!(result.dependencies[0].request, "./after-regex");
    }

    #[test]
    fn template_expression_holes_are_scanned() {
        let result = parse(r#"const x = `head ${require("./inner")} tail`;"#);
        assert_eq!(result.dependencies.len(), 1);
        assert_eq!(result.dependencies[0].request, "./inner");
    }

    #[test]
    fn dynamic_import_records_promise_rewrite() {
        let result = parse(r#"import("./lazy").then(m => m.run());"#);
        assert_eq!(result.dependencies.len(), 1);
        let dep = &result.dependencies[0];
        assert_eq!(dep.kind, DependencyKind::DynamicImport);
        assert!(dep.rewrite_prefix.starts_with("Promise.resolve()"));
        assert!(!result.build_meta.strict);
    }

    #[test]
    fn side_effect_import_marks_module_as_esm() {
        let result = parse(r#"import "./setup";"#);
        assert_eq!(result.dependencies.len(), 1);
        assert_eq!(result.dependencies[0].kind, DependencyKind::EsmImport);
        assert!(result.build_meta.strict);
        assert!(result.build_meta.uses_exports);
        // The __esModule marker is appended at EOF.
        assert!(result
            .replacements
            .iter()
            .any(|r| r.text.contains("__esModule")));
    }

    #[test]
    fn import_clause_forms_lower_to_bindings() {
        let result = parse(
            "import def from \"./a\";\nimport * as ns from \"./b\";\nimport { x, y as z } from \"./c\";\n",
        );
        assert_eq!(result.dependencies.len(), 3);

        let def = &result.dependencies[0];
        assert!(def.rewrite_prefix.starts_with("var __knot_import_0__ = "));
        assert!(def.rewrite_suffix.contains("__knot_require__.n"));
        assert!(def.rewrite_suffix.contains("var def = "));

        let ns = &result.dependencies[1];
        assert_eq!(ns.rewrite_prefix, "var ns = ");
        assert_eq!(ns.rewrite_suffix, "");

        let named = &result.dependencies[2];
        assert_eq!(named.rewrite_prefix, "var { x, y: z } = ");
    }

    #[test]
    fn export_default_and_declarations_lower_to_exports() {
        let source = "export default 42;\nexport const answer = 42;\nexport function ask() {}\n";
        let result = parse(source);

        assert_eq!(
            result.build_meta.exports,
            vec!["default", "answer", "ask"]
        );
        // `export default` span is rewritten in place.
        let default_rewrite = result
            .replacements
            .iter()
            .find(|r| r.text == "exports.default =")
            .unwrap();
        assert_eq!(
            &source[default_rewrite.span.start as usize..default_rewrite.span.end as usize],
            "export default"
        );
        // Declaration exports strip the keyword and append assignments.
        assert!(result
            .replacements
            .iter()
            .any(|r| r.text == "\nexports.answer = answer;"));
        assert!(result
            .replacements
            .iter()
            .any(|r| r.text == "\nexports.ask = ask;"));
    }

    #[test]
    fn export_from_forms_record_dependencies() {
        let result = parse(
            "export { a, b as c } from \"./x\";\nexport * from \"./y\";\nexport * as all from \"./z\";\n",
        );
        assert_eq!(result.dependencies.len(), 3);
        assert!(result.dependencies.iter().all(|d| d.kind == DependencyKind::EsmExportFrom));

        let named = &result.dependencies[0];
        assert!(named.rewrite_prefix.contains("a: __knot_reexport_0_0__"));
        assert!(named.rewrite_suffix.contains("exports.c = __knot_reexport_0_1__"));

        let star = &result.dependencies[1];
        assert_eq!(star.rewrite_prefix, "Object.assign(exports, ");

        let star_as = &result.dependencies[2];
        assert_eq!(star_as.rewrite_prefix, "exports.all = ");
        assert_eq!(result.exported_names(), vec!["a", "c", "all"]);
    }

    #[test]
    fn local_export_list_becomes_static_replacement() {
        let source = "const a = 1;\nexport { a, a as alias };\n";
        let result = parse(source);
        assert!(result.dependencies.is_empty());
        let rewrite = result
            .replacements
            .iter()
            .find(|r| r.text.contains("exports.alias"))
            .unwrap();
        assert_eq!(rewrite.text, "exports.a = a; exports.alias = a;");
    }

    #[test]
    fn use_strict_directive_is_detected() {
        let result = parse("\"use strict\";\nmodule.exports = 1;");
        assert!(result.build_meta.strict);
        assert!(result.build_meta.uses_module);
        assert!(!result.build_meta.uses_exports);
    }

    #[test]
    fn exports_object_usage_is_flagged() {
        let result = parse("exports.helper = function() {};");
        assert!(result.build_meta.uses_exports);
        assert!(!result.build_meta.uses_module);
        assert!(!result.build_meta.strict);
    }

    #[test]
    fn parser_options_can_disable_requires() {
        let parser = JavascriptParser::new(&serde_json::json!({"requires": false}));
        let result = parser.parse(r#"require("./a");"#).unwrap();
        assert!(result.dependencies.is_empty());
    }

    impl ParseResult {
        fn exported_names(&self) -> Vec<&str> {
            self.build_meta.exports.iter().map(String::as_str).collect()
        }
    }
}
