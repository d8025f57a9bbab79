use std::path::PathBuf;

use crate::command::{
    ChainEntry, CommandDescriptor, CommandLine, Connector, Input, Output, Pipeline, WriteMode,
};
use crate::error::ParseError;

/// Control and redirection operators recognized outside quotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Pipe,
    Or,
    Background,
    And,
    Semi,
    Less,
    Great,
    DGreat,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Pipe => "|",
            Operator::Or => "||",
            Operator::Background => "&",
            Operator::And => "&&",
            Operator::Semi => ";",
            Operator::Less => "<",
            Operator::Great => ">",
            Operator::DGreat => ">>",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Word(String),
    Op(Operator),
}

/// A token plus its byte span in the source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

/// States for the tokenizer state machine.
enum State {
    /// Between tokens: whitespace is skipped
    Normal,
    /// Building a word: whitespace or an operator ends it
    InWord,
    /// Inside double quotes: whitespace and operators are literal
    InDoubleQuote,
    /// Inside single quotes: everything is literal
    InSingleQuote,
}

/// Split a line into words and operators. Quoting and backslash escapes are
/// removed from words; quoted operator characters stay part of the word.
pub fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    let mut word_start = 0;
    let mut state = State::Normal;
    let mut chars = input.char_indices().peekable();

    while let Some((pos, ch)) = chars.next() {
        match (&state, ch) {
            // ── Between tokens / inside an unquoted word ──
            (State::Normal, ' ' | '\t' | '\n') => {}
            (State::InWord, ' ' | '\t' | '\n') => {
                push_word(&mut tokens, &mut word, word_start, pos);
                state = State::Normal;
            }
            (State::Normal | State::InWord, '|' | '&' | ';' | '<' | '>') => {
                if matches!(state, State::InWord) {
                    push_word(&mut tokens, &mut word, word_start, pos);
                }
                let doubled = matches!(ch, '|' | '&' | '>')
                    && chars.next_if(|&(_, next)| next == ch).is_some();
                let op = match (ch, doubled) {
                    ('|', false) => Operator::Pipe,
                    ('|', true) => Operator::Or,
                    ('&', false) => Operator::Background,
                    ('&', true) => Operator::And,
                    (';', _) => Operator::Semi,
                    ('<', _) => Operator::Less,
                    ('>', false) => Operator::Great,
                    _ => Operator::DGreat,
                };
                tokens.push(Token {
                    kind: TokenKind::Op(op),
                    start: pos,
                    end: pos + op.as_str().len(),
                });
                state = State::Normal;
            }
            (State::Normal, c) => {
                word_start = pos;
                state = State::InWord;
                match c {
                    '"' => state = State::InDoubleQuote,
                    '\'' => state = State::InSingleQuote,
                    '\\' => push_escaped(&mut word, chars.next().map(|(_, c)| c)),
                    c => word.push(c),
                }
            }
            (State::InWord, '"') => state = State::InDoubleQuote,
            (State::InWord, '\'') => state = State::InSingleQuote,
            (State::InWord, '\\') => push_escaped(&mut word, chars.next().map(|(_, c)| c)),
            (State::InWord, c) => word.push(c),

            // ── Inside "..." ──
            (State::InDoubleQuote, '"') => state = State::InWord,
            (State::InDoubleQuote, '\\') => match chars.next_if(|&(_, next)| {
                matches!(next, '"' | '\\' | '$' | '`')
            }) {
                Some((_, escaped)) => word.push(escaped),
                None => word.push('\\'),
            },
            (State::InDoubleQuote, c) => word.push(c),

            // ── Inside '...' ──
            (State::InSingleQuote, '\'') => state = State::InWord,
            (State::InSingleQuote, c) => word.push(c),
        }
    }

    // An unterminated quote keeps whatever it collected.
    if !matches!(state, State::Normal) {
        push_word(&mut tokens, &mut word, word_start, input.len());
    }

    tokens
}

fn push_word(tokens: &mut Vec<Token>, word: &mut String, start: usize, end: usize) {
    tokens.push(Token {
        kind: TokenKind::Word(std::mem::take(word)),
        start,
        end,
    });
}

fn push_escaped(word: &mut String, next: Option<char>) {
    word.push(next.unwrap_or('\\'));
}

/// Parse one input line into chained pipelines.
///
/// `;` and `&` end a pipeline (the latter marks it background); `&&` and `||`
/// gate the next pipeline on the previous status.
pub fn parse_line(input: &str) -> Result<CommandLine, ParseError> {
    let mut entries = Vec::new();
    let mut current: Vec<Token> = Vec::new();
    let mut connector = Connector::Sequence;
    let mut last_separator: Option<Operator> = None;

    for token in tokenize(input) {
        let op = match token.kind {
            TokenKind::Op(
                op @ (Operator::Semi | Operator::And | Operator::Or | Operator::Background),
            ) => op,
            _ => {
                current.push(token);
                continue;
            }
        };

        if current.is_empty() {
            return Err(ParseError::UnexpectedToken(op.as_str().to_string()));
        }
        let pipeline = build_pipeline(input, &current, op == Operator::Background)?;
        current.clear();
        entries.push(ChainEntry {
            connector,
            pipeline,
        });
        connector = match op {
            Operator::And => Connector::And,
            Operator::Or => Connector::Or,
            _ => Connector::Sequence,
        };
        last_separator = Some(op);
    }

    if current.is_empty() {
        if let Some(op @ (Operator::And | Operator::Or)) = last_separator {
            return Err(ParseError::UnexpectedEnd(op.as_str().to_string()));
        }
    } else {
        let pipeline = build_pipeline(input, &current, false)?;
        entries.push(ChainEntry {
            connector,
            pipeline,
        });
    }

    Ok(CommandLine { entries })
}

/// Turn the tokens of one `|`-chain into a [`Pipeline`].
fn build_pipeline(input: &str, tokens: &[Token], background: bool) -> Result<Pipeline, ParseError> {
    let segments: Vec<&[Token]> = tokens
        .split(|t| t.kind == TokenKind::Op(Operator::Pipe))
        .collect();
    let last = segments.len() - 1;

    let mut commands = Vec::with_capacity(segments.len());
    for (i, segment) in segments.iter().enumerate() {
        let command = build_command(segment)?;
        if i > 0 && matches!(command.input, Input::File(_)) {
            return Err(ParseError::ConflictingRedirect("input"));
        }
        if i < last && matches!(command.output, Output::File { .. }) {
            return Err(ParseError::ConflictingRedirect("output"));
        }
        commands.push(command);
    }

    // `tokens` is non-empty: the caller only builds pipelines from collected tokens.
    let start = tokens.first().map_or(0, |t| t.start);
    let end = tokens.last().map_or(input.len(), |t| t.end);
    Ok(Pipeline::new(input[start..end].to_string(), commands, background))
}

fn build_command(tokens: &[Token]) -> Result<CommandDescriptor, ParseError> {
    let mut argv = Vec::new();
    let mut input = Input::Inherit;
    let mut output = Output::Inherit;
    let mut iter = tokens.iter();

    while let Some(token) = iter.next() {
        let op = match &token.kind {
            TokenKind::Word(word) => {
                argv.push(word.clone());
                continue;
            }
            TokenKind::Op(op) => *op,
        };
        let target = match iter.next().map(|t| &t.kind) {
            Some(TokenKind::Word(word)) => PathBuf::from(word),
            _ => return Err(ParseError::MissingRedirectTarget(op.as_str().to_string())),
        };
        match op {
            Operator::Less => input = Input::File(target),
            Operator::Great => {
                output = Output::File {
                    path: target,
                    mode: WriteMode::Truncate,
                }
            }
            Operator::DGreat => {
                output = Output::File {
                    path: target,
                    mode: WriteMode::Append,
                }
            }
            other => return Err(ParseError::UnexpectedToken(other.as_str().to_string())),
        }
    }

    if argv.is_empty() {
        return Err(ParseError::UnexpectedToken(
            tokens
                .first()
                .map_or(Operator::Pipe.as_str(), |t| match &t.kind {
                    TokenKind::Op(op) => op.as_str(),
                    TokenKind::Word(_) => Operator::Pipe.as_str(),
                })
                .to_string(),
        ));
    }

    Ok(CommandDescriptor {
        argv,
        input,
        output,
    })
}
