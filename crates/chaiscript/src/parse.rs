//! Hand-written recursive-descent parser.
//!
//! The parser works directly over a char buffer with line/column tracking:
//! primitive matchers consume lexemes, grammar methods (one per production)
//! push result nodes onto a match stack, and `build_match` folds everything
//! a production matched into one node. No backtracking happens beyond the
//! token level; a partially-consumed production is a hard parse error.

use std::{fmt, rc::Rc};

use strum::{Display, IntoStaticStr};

use crate::error::CodeLoc;

/// AST node kinds, one per grammar production plus the leaf token kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
pub enum NodeKind {
    File,
    Block,
    Def,
    Lambda,
    If,
    While,
    For,
    Return,
    Break,
    Equation,
    Expression,
    Comparison,
    Additive,
    Multiplicative,
    Prefix,
    Negate,
    Not,
    DotAccess,
    FunCall,
    ArrayCall,
    ArgList,
    VarDecl,
    InlineArray,
    InlineMap,
    MapPair,
    Id,
    Int,
    Float,
    String,
    Char,
    /// A captured keyword or operator lexeme (`else`, `+=`, ...).
    Str,
}

/// One node of the parse tree, immutable once built.
#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    /// Literal text for leaf tokens, empty for productions.
    pub text: String,
    pub loc: CodeLoc,
    pub children: Vec<Rc<Node>>,
}

/// Malformed source. Fatal to the current eval call.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub reason: String,
    pub loc: CodeLoc,
}

impl ParseError {
    fn new(reason: impl Into<String>, loc: CodeLoc) -> Self {
        Self {
            reason: reason.into(),
            loc,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Parse error: \"{}\" at {}", self.reason, self.loc)
    }
}

impl std::error::Error for ParseError {}

/// Parses a source text into a `File` node, `None` for empty input.
pub fn parse(input: &str, filename: &str) -> Result<Option<Rc<Node>>, ParseError> {
    Parser::new(input, filename).parse()
}

#[derive(Clone, Copy)]
struct Mark {
    pos: usize,
    line: u32,
    col: u32,
}

struct Parser {
    input: Vec<char>,
    pos: usize,
    line: u32,
    col: u32,
    filename: Rc<str>,
    match_stack: Vec<Rc<Node>>,
}

impl Parser {
    fn new(input: &str, filename: &str) -> Self {
        Self {
            input: input.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
            filename: Rc::from(filename),
            match_stack: Vec::new(),
        }
    }

    // --- positions and stack plumbing ---

    fn peek(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn advance(&mut self) {
        self.pos += 1;
        self.col += 1;
    }

    fn mark(&self) -> Mark {
        Mark {
            pos: self.pos,
            line: self.line,
            col: self.col,
        }
    }

    fn restore(&mut self, mark: Mark) {
        self.pos = mark.pos;
        self.line = mark.line;
        self.col = mark.col;
    }

    fn loc_from(&self, mark: Mark) -> CodeLoc {
        CodeLoc::new(Rc::clone(&self.filename), mark.line, mark.col, self.line, self.col)
    }

    fn here(&self) -> CodeLoc {
        CodeLoc::new(Rc::clone(&self.filename), self.line, self.col, self.line, self.col)
    }

    fn error(&self, reason: impl Into<String>) -> ParseError {
        ParseError::new(reason, self.here())
    }

    fn matched_text(&self, mark: Mark) -> String {
        self.input[mark.pos..self.pos].iter().collect()
    }

    fn push_token(&mut self, kind: NodeKind, text: String, mark: Mark) {
        self.match_stack.push(Rc::new(Node {
            kind,
            text,
            loc: self.loc_from(mark),
            children: Vec::new(),
        }));
    }

    /// Folds every node pushed since `stack_top` into one new node.
    fn build_match(&mut self, kind: NodeKind, stack_top: usize) {
        let children: Vec<Rc<Node>> = self.match_stack.drain(stack_top..).collect();
        let loc = match children.first() {
            Some(first) => CodeLoc::new(
                Rc::clone(&self.filename),
                first.loc.start_line,
                first.loc.start_col,
                self.line,
                self.col,
            ),
            None => self.here(),
        };
        self.match_stack.push(Rc::new(Node {
            kind,
            text: String::new(),
            loc,
            children,
        }));
    }

    // --- whitespace and comments ---

    fn skip_comment(&mut self) -> bool {
        if self.symbol_raw("/*") {
            while !self.at_end() {
                if self.symbol_raw("*/") {
                    break;
                }
                if !self.eol_raw() {
                    self.advance();
                }
            }
            return true;
        }
        if self.symbol_raw("//") {
            // leave the newline for the statement separator
            while let Some(c) = self.peek() {
                if c == '\n' || c == '\r' {
                    break;
                }
                self.advance();
            }
            return true;
        }
        false
    }

    fn skip_ws(&mut self) {
        loop {
            match self.peek() {
                Some(' ' | '\t') => self.advance(),
                _ => {
                    if !self.skip_comment() {
                        break;
                    }
                }
            }
        }
    }

    // --- primitive matchers ---

    fn char_raw(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn char_token(&mut self, c: char) -> bool {
        self.skip_ws();
        self.char_raw(c)
    }

    fn symbol_raw(&mut self, s: &str) -> bool {
        let mark = self.mark();
        for expected in s.chars() {
            if !self.char_raw(expected) {
                self.restore(mark);
                return false;
            }
        }
        true
    }

    /// Matches an operator lexeme, refusing prefix matches: `-` does not
    /// match the start of `-=`.
    fn symbol(&mut self, s: &str, capture: bool) -> bool {
        self.skip_ws();
        let mark = self.mark();
        if !self.symbol_raw(s) {
            return false;
        }
        if matches!(self.peek(), Some('+' | '-' | '*' | '/' | '=')) {
            self.restore(mark);
            return false;
        }
        if capture {
            let text = self.matched_text(mark);
            self.push_token(NodeKind::Str, text, mark);
        }
        true
    }

    /// Matches a keyword with a word boundary after it.
    fn keyword(&mut self, s: &str, capture: bool) -> bool {
        self.skip_ws();
        let mark = self.mark();
        if !self.symbol_raw(s) {
            return false;
        }
        if self.peek().is_some_and(is_id_char) {
            self.restore(mark);
            return false;
        }
        if capture {
            let text = self.matched_text(mark);
            self.push_token(NodeKind::Str, text, mark);
        }
        true
    }

    fn eol_raw(&mut self) -> bool {
        if self.symbol_raw("\r\n") || self.char_raw('\n') {
            self.line += 1;
            self.col = 1;
            true
        } else {
            self.char_raw(';')
        }
    }

    fn eol(&mut self) -> bool {
        self.skip_ws();
        self.eol_raw()
    }

    fn int_raw(&mut self) -> bool {
        if !self.peek().is_some_and(|c| c.is_ascii_digit()) {
            return false;
        }
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        true
    }

    fn float_raw(&mut self) -> bool {
        let mark = self.mark();
        if self.int_raw() && self.char_raw('.') && self.int_raw() {
            true
        } else {
            self.restore(mark);
            false
        }
    }

    fn num_token(&mut self) -> bool {
        self.skip_ws();
        let mark = self.mark();
        if self.float_raw() {
            let text = self.matched_text(mark);
            self.push_token(NodeKind::Float, text, mark);
            true
        } else if self.int_raw() {
            let text = self.matched_text(mark);
            self.push_token(NodeKind::Int, text, mark);
            true
        } else {
            false
        }
    }

    fn id_raw(&mut self) -> bool {
        if !self.peek().is_some_and(|c| c.is_ascii_alphabetic() || c == '_') {
            return false;
        }
        while self.peek().is_some_and(is_id_char) {
            self.advance();
        }
        true
    }

    fn id(&mut self, capture: bool) -> bool {
        self.skip_ws();
        let mark = self.mark();
        if !self.id_raw() {
            return false;
        }
        if capture {
            let text = self.matched_text(mark);
            self.push_token(NodeKind::Id, text, mark);
        }
        true
    }

    /// Backtick-quoted verbatim identifier: `` `+` `` names the function
    /// registered under `+`.
    fn id_literal(&mut self) -> Result<bool, ParseError> {
        self.skip_ws();
        if self.peek() != Some('`') {
            return Ok(false);
        }
        let mark = self.mark();
        self.advance();
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == '`' {
                break;
            }
            if c == '\n' || c == '\r' {
                return Err(self.error("Carriage return in identifier literal"));
            }
            self.advance();
        }
        if self.pos == start {
            return Err(self.error("Missing contents of identifier literal"));
        }
        if self.at_end() {
            return Err(self.error("Incomplete identifier literal"));
        }
        let text: String = self.input[start..self.pos].iter().collect();
        self.advance();
        self.push_token(NodeKind::Id, text, mark);
        Ok(true)
    }

    fn string_token(&mut self, delimiter: char, kind: NodeKind) -> Result<bool, ParseError> {
        self.skip_ws();
        if self.peek() != Some(delimiter) {
            return Ok(false);
        }
        let mark = self.mark();
        self.advance();
        let mut text = String::new();
        loop {
            match self.peek() {
                None => {
                    return Err(self.error(if delimiter == '"' {
                        "Unclosed quoted string"
                    } else {
                        "Unclosed single-quoted string"
                    }));
                }
                Some(c) if c == delimiter => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    let Some(escaped) = self.peek() else {
                        return Err(self.error("Unclosed quoted string"));
                    };
                    match escaped {
                        'b' => text.push('\u{0008}'),
                        'f' => text.push('\u{000C}'),
                        'n' => text.push('\n'),
                        'r' => text.push('\r'),
                        't' => text.push('\t'),
                        '\'' => text.push('\''),
                        '"' => text.push('"'),
                        '\\' => text.push('\\'),
                        _ => return Err(self.error("Unknown escaped sequence in string")),
                    }
                    self.advance();
                }
                Some('\n' | '\r') => {
                    return Err(self.error(if delimiter == '"' {
                        "Unclosed quoted string"
                    } else {
                        "Unclosed single-quoted string"
                    }));
                }
                Some(c) => {
                    text.push(c);
                    self.advance();
                }
            }
        }
        self.push_token(kind, text, mark);
        Ok(true)
    }

    // --- grammar productions ---

    fn arg_list(&mut self) -> Result<bool, ParseError> {
        let stack_top = self.match_stack.len();
        if !self.equation()? {
            return Ok(false);
        }
        while self.char_token(',') {
            if !self.equation()? {
                return Err(self.error("Unexpected value in parameter list"));
            }
        }
        self.build_match(NodeKind::ArgList, stack_top);
        Ok(true)
    }

    fn container_arg_list(&mut self) -> Result<bool, ParseError> {
        let stack_top = self.match_stack.len();
        if !self.map_pair()? {
            return Ok(false);
        }
        while self.char_token(',') {
            if !self.map_pair()? {
                return Err(self.error("Unexpected value in container"));
            }
        }
        self.build_match(NodeKind::ArgList, stack_top);
        Ok(true)
    }

    fn lambda(&mut self) -> Result<bool, ParseError> {
        let stack_top = self.match_stack.len();
        if !self.keyword("fun", false) {
            return Ok(false);
        }
        if self.char_token('(') {
            self.arg_list()?;
            if !self.char_token(')') {
                return Err(self.error("Incomplete anonymous function"));
            }
        }
        while self.eol() {}
        if !self.block()? {
            return Err(self.error("Incomplete anonymous function"));
        }
        self.build_match(NodeKind::Lambda, stack_top);
        Ok(true)
    }

    fn def(&mut self) -> Result<bool, ParseError> {
        let stack_top = self.match_stack.len();
        if !self.keyword("def", false) {
            return Ok(false);
        }
        if !self.id(true) {
            return Err(self.error("Missing function name in definition"));
        }
        if self.char_token('(') {
            self.arg_list()?;
            if !self.char_token(')') {
                return Err(self.error("Incomplete function definition"));
            }
        }
        while self.eol() {}
        if self.char_token(':') {
            if !self.expression()? {
                return Err(self.error("Missing guard expression for function"));
            }
        }
        while self.eol() {}
        if !self.block()? {
            return Err(self.error("Incomplete function definition"));
        }
        self.build_match(NodeKind::Def, stack_top);
        Ok(true)
    }

    fn if_block(&mut self) -> Result<bool, ParseError> {
        let stack_top = self.match_stack.len();
        if !self.keyword("if", false) {
            return Ok(false);
        }
        if !self.char_token('(') {
            return Err(self.error("Incomplete 'if' expression"));
        }
        if !(self.expression()? && self.char_token(')')) {
            return Err(self.error("Incomplete 'if' expression"));
        }
        while self.eol() {}
        if !self.block()? {
            return Err(self.error("Incomplete 'if' block"));
        }
        loop {
            while self.eol() {}
            if self.keyword("elseif", true) {
                if !self.char_token('(') {
                    return Err(self.error("Incomplete 'elseif' expression"));
                }
                if !(self.expression()? && self.char_token(')')) {
                    return Err(self.error("Incomplete 'elseif' expression"));
                }
                while self.eol() {}
                if !self.block()? {
                    return Err(self.error("Incomplete 'elseif' block"));
                }
            } else if self.keyword("else", true) {
                while self.eol() {}
                if !self.block()? {
                    return Err(self.error("Incomplete 'else' block"));
                }
            } else {
                break;
            }
        }
        self.build_match(NodeKind::If, stack_top);
        Ok(true)
    }

    fn while_block(&mut self) -> Result<bool, ParseError> {
        let stack_top = self.match_stack.len();
        if !self.keyword("while", false) {
            return Ok(false);
        }
        if !self.char_token('(') {
            return Err(self.error("Incomplete 'while' expression"));
        }
        if !(self.expression()? && self.char_token(')')) {
            return Err(self.error("Incomplete 'while' expression"));
        }
        while self.eol() {}
        if !self.block()? {
            return Err(self.error("Incomplete 'while' block"));
        }
        self.build_match(NodeKind::While, stack_top);
        Ok(true)
    }

    fn for_guards(&mut self) -> Result<bool, ParseError> {
        self.equation()?;
        if self.char_token(';') && self.expression()? && self.char_token(';') && self.equation()? {
            Ok(true)
        } else {
            Err(self.error("Incomplete conditions in 'for' loop"))
        }
    }

    fn for_block(&mut self) -> Result<bool, ParseError> {
        let stack_top = self.match_stack.len();
        if !self.keyword("for", false) {
            return Ok(false);
        }
        if !self.char_token('(') {
            return Err(self.error("Incomplete 'for' expression"));
        }
        if !(self.for_guards()? && self.char_token(')')) {
            return Err(self.error("Incomplete 'for' expression"));
        }
        while self.eol() {}
        if !self.block()? {
            return Err(self.error("Incomplete 'for' block"));
        }
        self.build_match(NodeKind::For, stack_top);
        Ok(true)
    }

    fn block(&mut self) -> Result<bool, ParseError> {
        let stack_top = self.match_stack.len();
        if !self.char_token('{') {
            return Ok(false);
        }
        self.statements()?;
        if !self.char_token('}') {
            return Err(self.error("Incomplete block"));
        }
        self.build_match(NodeKind::Block, stack_top);
        Ok(true)
    }

    fn return_stmt(&mut self) -> Result<bool, ParseError> {
        let stack_top = self.match_stack.len();
        if !self.keyword("return", false) {
            return Ok(false);
        }
        self.expression()?;
        self.build_match(NodeKind::Return, stack_top);
        Ok(true)
    }

    fn break_stmt(&mut self) -> bool {
        let stack_top = self.match_stack.len();
        if !self.keyword("break", false) {
            return false;
        }
        self.build_match(NodeKind::Break, stack_top);
        true
    }

    fn id_fun_array(&mut self) -> Result<bool, ParseError> {
        let stack_top = self.match_stack.len();
        if !(self.id(true) || self.id_literal()?) {
            return Ok(false);
        }
        loop {
            if self.char_token('(') {
                self.arg_list()?;
                if !self.char_token(')') {
                    return Err(self.error("Incomplete function call"));
                }
                self.build_match(NodeKind::FunCall, stack_top);
            } else if self.char_token('[') {
                if !(self.expression()? && self.char_token(']')) {
                    return Err(self.error("Incomplete array access"));
                }
                self.build_match(NodeKind::ArrayCall, stack_top);
            } else {
                break;
            }
        }
        Ok(true)
    }

    fn var_decl(&mut self) -> Result<bool, ParseError> {
        let stack_top = self.match_stack.len();
        if !self.keyword("var", false) {
            return Ok(false);
        }
        if !self.id(true) {
            return Err(self.error("Incomplete variable declaration"));
        }
        self.build_match(NodeKind::VarDecl, stack_top);
        Ok(true)
    }

    fn paren_expression(&mut self) -> Result<bool, ParseError> {
        if !self.char_token('(') {
            return Ok(false);
        }
        if !self.expression()? {
            return Err(self.error("Incomplete expression"));
        }
        if !self.char_token(')') {
            return Err(self.error("Missing closing parenthesis"));
        }
        Ok(true)
    }

    fn inline_container(&mut self) -> Result<bool, ParseError> {
        let stack_top = self.match_stack.len();
        if !self.char_token('[') {
            return Ok(false);
        }
        self.container_arg_list()?;
        if !self.char_token(']') {
            return Err(self.error("Missing closing square bracket"));
        }
        let is_map = self
            .match_stack
            .get(stack_top)
            .and_then(|args| args.children.first())
            .is_some_and(|first| first.kind == NodeKind::MapPair);
        if is_map {
            self.build_match(NodeKind::InlineMap, stack_top);
        } else {
            self.build_match(NodeKind::InlineArray, stack_top);
        }
        Ok(true)
    }

    fn value(&mut self) -> Result<bool, ParseError> {
        Ok(self.var_decl()?
            || self.lambda()?
            || self.id_fun_array()?
            || self.num_token()
            || self.prefix()?
            || self.string_token('"', NodeKind::String)?
            || self.string_token('\'', NodeKind::Char)?
            || self.paren_expression()?
            || self.inline_container()?)
    }

    fn prefix(&mut self) -> Result<bool, ParseError> {
        let stack_top = self.match_stack.len();
        if self.symbol("-", false) {
            if !self.dot_access()? {
                return Err(self.error("Incomplete negation expression"));
            }
            self.build_match(NodeKind::Negate, stack_top);
            Ok(true)
        } else if self.symbol("!", false) {
            if !self.dot_access()? {
                return Err(self.error("Incomplete '!' expression"));
            }
            self.build_match(NodeKind::Not, stack_top);
            Ok(true)
        } else if self.symbol("++", true) {
            if !self.dot_access()? {
                return Err(self.error("Incomplete '++' expression"));
            }
            self.build_match(NodeKind::Prefix, stack_top);
            Ok(true)
        } else if self.symbol("--", true) {
            if !self.dot_access()? {
                return Err(self.error("Incomplete '--' expression"));
            }
            self.build_match(NodeKind::Prefix, stack_top);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn dot_access(&mut self) -> Result<bool, ParseError> {
        let stack_top = self.match_stack.len();
        if !self.value()? {
            return Ok(false);
        }
        if self.symbol(".", false) {
            loop {
                if !self.value()? {
                    return Err(self.error("Incomplete dot notation"));
                }
                if !self.symbol(".", false) {
                    break;
                }
            }
            self.build_match(NodeKind::DotAccess, stack_top);
        }
        Ok(true)
    }

    fn multiplicative(&mut self) -> Result<bool, ParseError> {
        let stack_top = self.match_stack.len();
        if !self.dot_access()? {
            return Ok(false);
        }
        if self.symbol("*", true) || self.symbol("/", true) || self.symbol("%", true) {
            loop {
                if !self.dot_access()? {
                    return Err(self.error("Incomplete math expression"));
                }
                if !(self.symbol("*", true) || self.symbol("/", true) || self.symbol("%", true)) {
                    break;
                }
            }
            self.build_match(NodeKind::Multiplicative, stack_top);
        }
        Ok(true)
    }

    fn additive(&mut self) -> Result<bool, ParseError> {
        let stack_top = self.match_stack.len();
        if !self.multiplicative()? {
            return Ok(false);
        }
        if self.symbol("+", true) || self.symbol("-", true) {
            loop {
                if !self.multiplicative()? {
                    return Err(self.error("Incomplete math expression"));
                }
                if !(self.symbol("+", true) || self.symbol("-", true)) {
                    break;
                }
            }
            self.build_match(NodeKind::Additive, stack_top);
        }
        Ok(true)
    }

    fn comparison_op(&mut self) -> bool {
        self.symbol(">=", true)
            || self.symbol(">", true)
            || self.symbol("<=", true)
            || self.symbol("<", true)
            || self.symbol("==", true)
            || self.symbol("!=", true)
    }

    fn comparison(&mut self) -> Result<bool, ParseError> {
        let stack_top = self.match_stack.len();
        if !self.additive()? {
            return Ok(false);
        }
        if self.comparison_op() {
            loop {
                if !self.additive()? {
                    return Err(self.error("Incomplete comparison expression"));
                }
                if !self.comparison_op() {
                    break;
                }
            }
            self.build_match(NodeKind::Comparison, stack_top);
        }
        Ok(true)
    }

    fn expression(&mut self) -> Result<bool, ParseError> {
        let stack_top = self.match_stack.len();
        if !self.comparison()? {
            return Ok(false);
        }
        if self.symbol("&&", true) || self.symbol("||", true) {
            loop {
                if !self.comparison()? {
                    return Err(self.error("Incomplete expression"));
                }
                if !(self.symbol("&&", true) || self.symbol("||", true)) {
                    break;
                }
            }
            self.build_match(NodeKind::Expression, stack_top);
        }
        Ok(true)
    }

    fn map_pair(&mut self) -> Result<bool, ParseError> {
        let stack_top = self.match_stack.len();
        if !self.expression()? {
            return Ok(false);
        }
        if self.symbol(":", false) {
            if !self.expression()? {
                return Err(self.error("Incomplete map pair"));
            }
            self.build_match(NodeKind::MapPair, stack_top);
        }
        Ok(true)
    }

    /// Right-associative assignment chain: `a = b = c` nests to the right.
    fn equation(&mut self) -> Result<bool, ParseError> {
        let stack_top = self.match_stack.len();
        if !self.expression()? {
            return Ok(false);
        }
        if self.symbol("=", true)
            || self.symbol(":=", true)
            || self.symbol("+=", true)
            || self.symbol("-=", true)
            || self.symbol("*=", true)
            || self.symbol("/=", true)
        {
            if !self.equation()? {
                return Err(self.error("Incomplete equation"));
            }
            self.build_match(NodeKind::Equation, stack_top);
        }
        Ok(true)
    }

    fn statement(&mut self) -> Result<bool, ParseError> {
        Ok(self.return_stmt()? || self.break_stmt() || self.equation()?)
    }

    fn statements(&mut self) -> Result<bool, ParseError> {
        let mut matched_any = false;
        let mut saw_eol = true;
        loop {
            if self.def()? || self.if_block()? || self.while_block()? || self.for_block()? {
                if !saw_eol {
                    return Err(self.error("Two function definitions missing line separator"));
                }
                matched_any = true;
                saw_eol = true;
            } else if self.statement()? {
                if !saw_eol {
                    return Err(self.error("Two expressions missing line separator"));
                }
                matched_any = true;
                saw_eol = false;
            } else if self.eol() {
                matched_any = true;
                saw_eol = true;
            } else {
                break;
            }
        }
        Ok(matched_any)
    }

    fn parse(mut self) -> Result<Option<Rc<Node>>, ParseError> {
        // shebang line on script files
        if self.peek() == Some('#') {
            while !self.at_end() && !self.eol_raw() {
                self.advance();
            }
        }

        if !self.statements()? {
            self.skip_ws();
            if self.at_end() {
                return Ok(None);
            }
            return Err(self.error("Unparsed input"));
        }
        self.skip_ws();
        if !self.at_end() {
            return Err(self.error("Unparsed input"));
        }
        self.build_match(NodeKind::File, 0);
        Ok(self.match_stack.pop())
    }
}

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(input: &str) -> Rc<Node> {
        parse(input, "test").unwrap().expect("non-empty parse")
    }

    #[test]
    fn literals_and_precedence() {
        let file = parse_ok("1 + 2 * 3");
        assert_eq!(file.kind, NodeKind::File);
        let additive = &file.children[0];
        assert_eq!(additive.kind, NodeKind::Additive);
        assert_eq!(additive.children[0].kind, NodeKind::Int);
        assert_eq!(additive.children[1].text, "+");
        assert_eq!(additive.children[2].kind, NodeKind::Multiplicative);
    }

    #[test]
    fn float_literal() {
        let file = parse_ok("2.5");
        assert_eq!(file.children[0].kind, NodeKind::Float);
        assert_eq!(file.children[0].text, "2.5");
    }

    #[test]
    fn string_escapes() {
        let file = parse_ok(r#""a\tb\n\\""#);
        assert_eq!(file.children[0].kind, NodeKind::String);
        assert_eq!(file.children[0].text, "a\tb\n\\");
    }

    #[test]
    fn unclosed_string_is_an_error() {
        let error = parse("\"abc", "test").unwrap_err();
        assert!(error.reason.contains("Unclosed quoted string"));
    }

    #[test]
    fn incomplete_if_reports_position() {
        let error = parse("if(x", "test").unwrap_err();
        assert!(error.reason.contains("Incomplete 'if' expression"));
        assert_eq!(error.loc.start_line, 1);
        assert_eq!(error.loc.start_col, 5);
    }

    #[test]
    fn def_without_name_is_an_error() {
        let error = parse("def (a) { a }", "test").unwrap_err();
        assert!(error.reason.contains("Missing function name"));
    }

    #[test]
    fn def_with_guard() {
        let file = parse_ok("def f(n) : n > 0 { n }");
        let def = &file.children[0];
        assert_eq!(def.kind, NodeKind::Def);
        assert_eq!(def.children.len(), 4);
        assert_eq!(def.children[0].text, "f");
        assert_eq!(def.children[1].kind, NodeKind::ArgList);
        assert_eq!(def.children[2].kind, NodeKind::Comparison);
        assert_eq!(def.children[3].kind, NodeKind::Block);
    }

    #[test]
    fn two_statements_need_a_separator() {
        assert!(parse("1 + 1 2 + 2", "test").is_err());
        assert!(parse("1 + 1; 2 + 2", "test").is_ok());
        assert!(parse("1 + 1\n2 + 2", "test").is_ok());
    }

    #[test]
    fn trailing_comment_keeps_statement_separation() {
        assert!(parse("var x = 1 // first\nx = 2", "test").is_ok());
    }

    #[test]
    fn method_call_sugar_shape() {
        let file = parse_ok("\"hello\".size()");
        let dot = &file.children[0];
        assert_eq!(dot.kind, NodeKind::DotAccess);
        assert_eq!(dot.children[0].kind, NodeKind::String);
        assert_eq!(dot.children[1].kind, NodeKind::FunCall);
    }

    #[test]
    fn inline_array_and_map() {
        let array = parse_ok("[1, 2, 3]");
        assert_eq!(array.children[0].kind, NodeKind::InlineArray);
        let map = parse_ok("[\"a\" : 1, \"b\" : 2]");
        assert_eq!(map.children[0].kind, NodeKind::InlineMap);
        let empty = parse_ok("[]");
        assert_eq!(empty.children[0].kind, NodeKind::InlineArray);
    }

    #[test]
    fn backtick_identifier() {
        let file = parse_ok("`+`(1, 2)");
        let call = &file.children[0];
        assert_eq!(call.kind, NodeKind::FunCall);
        assert_eq!(call.children[0].text, "+");
    }

    #[test]
    fn equation_is_right_associative() {
        let file = parse_ok("a = b = 1");
        let outer = &file.children[0];
        assert_eq!(outer.kind, NodeKind::Equation);
        assert_eq!(outer.children.len(), 3);
        assert_eq!(outer.children[2].kind, NodeKind::Equation);
    }

    #[test]
    fn compound_assignment_is_not_split() {
        let file = parse_ok("x -= 1");
        let equation = &file.children[0];
        assert_eq!(equation.kind, NodeKind::Equation);
        assert_eq!(equation.children[1].text, "-=");
    }

    #[test]
    fn empty_input_parses_to_none() {
        assert!(parse("", "test").unwrap().is_none());
        assert!(parse("   \n  \n", "test").unwrap().is_none());
    }

    #[test]
    fn trailing_garbage_is_reported() {
        let error = parse("1 + 1\n@@", "test").unwrap_err();
        assert!(error.reason.contains("Unparsed input"));
    }

    #[test]
    fn lambda_value() {
        let file = parse_ok("fun(x) { x * x }");
        let lambda = &file.children[0];
        assert_eq!(lambda.kind, NodeKind::Lambda);
        assert_eq!(lambda.children[0].kind, NodeKind::ArgList);
        assert_eq!(lambda.children[1].kind, NodeKind::Block);
    }

    #[test]
    fn for_loop_shape() {
        let file = parse_ok("for (var i = 0; i < 10; i += 1) { i }");
        let for_node = &file.children[0];
        assert_eq!(for_node.kind, NodeKind::For);
        assert_eq!(for_node.children.len(), 4);
    }

    #[test]
    fn block_comments_do_not_leak() {
        let file = parse_ok("1 /* comment *// 1");
        assert_eq!(file.children[0].kind, NodeKind::Multiplicative);
    }
}
