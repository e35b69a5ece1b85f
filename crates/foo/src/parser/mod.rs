//! # Parser
//!
//! Recursive descent over Foo source text.
//!
//! ## Supported Syntax
//!
//! ```text
//! file        = declaration*
//! declaration = var | def
//! var         = "var" ident ";"
//! def         = "def" ident "(" params? ")" block
//! params      = ident ("," ident)*
//! block       = "{" (block | any)* "}"
//! ident       = (alpha | "_") (alnum | "_")*
//! ```
//!
//! Whitespace and `//` line comments may appear between any two tokens.
//! A malformed declaration is reported as a [`ParseError`] and skipped up to
//! and including the next `;` or `}`; parsing then resumes.
//!
//! All positions are character offsets, the unit [`TextRange`] uses.

use handly_model::TextRange;


/// A syntax error.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ParseError {
	/// Human-readable description of the error.
	pub message: String,
	/// Character offset where the error occurred.
	pub position: usize,
}

impl std::fmt::Display for ParseError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "Parse error at position {}: {}", self.position, self.message)
	}
}

impl std::error::Error for ParseError {}

/// What a declaration declares.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum DeclarationKind {
	/// `var x;`
	Var,
	/// `def f(a, b) { ... }`
	Def {
		/// Parameter names in order.
		parameters: Vec<String>,
	},
}

/// One top-level declaration.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Declaration {
	pub kind: DeclarationKind,
	pub name: String,
	/// From the keyword up to and including the closing `;` or `}`.
	pub full_range: TextRange,
	pub name_range: TextRange,
}

/// Result of parsing one file.
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct ParsedFile {
	pub declarations: Vec<Declaration>,
	pub problems: Vec<ParseError>,
}

/// Parses `text`, recovering from syntax errors.
pub fn parse(text: &str) -> ParsedFile {
	let mut parser = Parser::new(text);
	let mut parsed = ParsedFile::default();
	loop {
		parser.skip_trivia();
		if parser.is_end() {
			break;
		}
		match parser.declaration() {
			Ok(declaration) => parsed.declarations.push(declaration),
			Err(error) => {
				parsed.problems.push(error);
				parser.recover();
			}
		}
	}
	parsed
}

struct Parser {
	chars: Vec<char>,
	position: usize,
}

impl Parser {
	fn new(input: &str) -> Self {
		Self {
			chars: input.chars().collect(),
			position: 0,
		}
	}

	fn peek(&self) -> Option<char> {
		self.peek_at(0)
	}

	fn peek_at(&self, n: usize) -> Option<char> {
		self.chars.get(self.position + n).copied()
	}

	fn next(&mut self) -> Option<char> {
		let ch = self.peek()?;
		self.position += 1;
		Some(ch)
	}

	fn is_end(&self) -> bool {
		self.position >= self.chars.len()
	}

	fn error(&self, message: impl Into<String>) -> ParseError {
		ParseError {
			message: message.into(),
			position: self.position,
		}
	}

	/// Skips whitespace and line comments.
	fn skip_trivia(&mut self) {
		loop {
			match self.peek() {
				Some(ch) if ch.is_whitespace() => {
					self.next();
				}
				Some('/') if self.peek_at(1) == Some('/') => self.skip_line(),
				_ => break,
			}
		}
	}

	fn skip_line(&mut self) {
		while let Some(ch) = self.next() {
			if ch == '\n' {
				break;
			}
		}
	}

	/// Consumes `expected` after optional trivia.
	fn take(&mut self, expected: char) -> Result<(), ParseError> {
		self.skip_trivia();
		match self.peek() {
			Some(ch) if ch == expected => {
				self.next();
				Ok(())
			}
			Some(ch) => Err(self.error(format!("expected '{expected}', found '{ch}'"))),
			None => Err(self.error(format!("expected '{expected}', found end of input"))),
		}
	}

	fn ident(&mut self) -> Result<(String, TextRange), ParseError> {
		self.skip_trivia();
		let start = self.position;
		match self.peek() {
			Some(ch) if ch.is_alphabetic() || ch == '_' => {}
			Some(ch) => return Err(self.error(format!("expected identifier, found '{ch}'"))),
			None => return Err(self.error("expected identifier, found end of input")),
		}
		let mut name = String::new();
		while let Some(ch) = self.peek() {
			if ch.is_alphanumeric() || ch == '_' {
				name.push(ch);
				self.next();
			} else {
				break;
			}
		}
		Ok((name, TextRange::from_bounds(start, self.position)))
	}

	fn declaration(&mut self) -> Result<Declaration, ParseError> {
		let start = self.position;
		let (keyword, keyword_range) = self.ident()?;
		match keyword.as_str() {
			"var" => {
				let (name, name_range) = self.ident()?;
				self.take(';')?;
				Ok(Declaration {
					kind: DeclarationKind::Var,
					name,
					full_range: TextRange::from_bounds(start, self.position),
					name_range,
				})
			}
			"def" => {
				let (name, name_range) = self.ident()?;
				let parameters = self.parameters()?;
				self.block()?;
				Ok(Declaration {
					kind: DeclarationKind::Def { parameters },
					name,
					full_range: TextRange::from_bounds(start, self.position),
					name_range,
				})
			}
			other => Err(ParseError {
				message: format!("expected 'var' or 'def', found '{other}'"),
				position: keyword_range.offset,
			}),
		}
	}

	fn parameters(&mut self) -> Result<Vec<String>, ParseError> {
		self.take('(')?;
		let mut parameters = Vec::new();
		self.skip_trivia();
		if self.peek() == Some(')') {
			self.next();
			return Ok(parameters);
		}
		loop {
			let (name, _) = self.ident()?;
			parameters.push(name);
			self.skip_trivia();
			match self.peek() {
				Some(',') => {
					self.next();
				}
				Some(')') => {
					self.next();
					return Ok(parameters);
				}
				Some(ch) => return Err(self.error(format!("expected ',' or ')', found '{ch}'"))),
				None => return Err(self.error("expected ')', found end of input")),
			}
		}
	}

	/// Consumes a brace-balanced block.
	fn block(&mut self) -> Result<(), ParseError> {
		self.take('{')?;
		let mut depth = 1usize;
		while depth > 0 {
			match self.peek() {
				Some('/') if self.peek_at(1) == Some('/') => self.skip_line(),
				Some(ch) => {
					self.next();
					match ch {
						'{' => depth += 1,
						'}' => depth -= 1,
						_ => {}
					}
				}
				None => return Err(self.error("unterminated block")),
			}
		}
		Ok(())
	}

	/// Skips past the next `;` or `}`.
	fn recover(&mut self) {
		while let Some(ch) = self.next() {
			if ch == ';' || ch == '}' {
				break;
			}
		}
	}
}
