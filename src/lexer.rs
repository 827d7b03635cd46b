//! Lexical analysis for the shell's input line.
//!
//! The grammar is deliberately tiny: words are separated by runs of whitespace and
//! the pipe symbol `|` is always a token of its own, even when written without
//! surrounding spaces. There is no quoting, so a word can never contain whitespace.

use std::fmt;

/// Represents a token resulting from lexical analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A program name or argument.
    Word(String),
    /// The pipe operator, `|`.
    PipeOp,
}

impl Token {
    /// Source text of the token.
    pub fn as_str(&self) -> &str {
        match self {
            Token::Word(w) => w,
            Token::PipeOp => "|",
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexingState {
    Start,
    ReadingWord,
}

struct LexingFSM<'a> {
    input: std::str::Chars<'a>,
    state: LexingState,
    buffer: String,
}

impl<'a> LexingFSM<'a> {
    fn new(line: &'a str) -> Self {
        LexingFSM {
            input: line.chars(),
            state: LexingState::Start,
            buffer: String::new(),
        }
    }

    fn make_tokens(mut self) -> Vec<Token> {
        let mut out = Vec::new();

        while let Some(ch) = self.input.next() {
            match (self.state, ch) {
                (_, '|') => {
                    self.finish_word(&mut out);
                    out.push(Token::PipeOp);
                }
                (LexingState::Start, c) if c.is_whitespace() => {}
                (LexingState::ReadingWord, c) if c.is_whitespace() => self.finish_word(&mut out),
                (_, c) => {
                    self.buffer.push(c);
                    self.state = LexingState::ReadingWord;
                }
            }
        }

        self.finish_word(&mut out);
        out
    }

    fn finish_word(&mut self, out: &mut Vec<Token>) {
        if !self.buffer.is_empty() {
            out.push(Token::Word(std::mem::take(&mut self.buffer)));
        }
        self.state = LexingState::Start;
    }
}

/// Splits a raw input line into tokens.
///
/// Empty or whitespace-only input produces an empty vector.
pub fn split_into_tokens(line: &str) -> Vec<Token> {
    LexingFSM::new(line).make_tokens()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn texts(tokens: &[Token]) -> Vec<&str> {
        tokens.iter().map(Token::as_str).collect()
    }

    #[test]
    fn collapses_whitespace_runs() {
        let tokens = split_into_tokens("echo a  b");
        assert_eq!(texts(&tokens), vec!["echo", "a", "b"]);
    }

    #[test]
    fn keeps_pipe_as_separate_token() {
        let tokens = split_into_tokens("a | b | c");
        assert_eq!(texts(&tokens), vec!["a", "|", "b", "|", "c"]);
        assert_eq!(tokens[1], Token::PipeOp);
        assert_eq!(tokens[3], Token::PipeOp);
    }

    #[test]
    fn pipe_without_spaces_is_not_merged() {
        let tokens = split_into_tokens("ls -l|wc -l");
        assert_eq!(
            tokens,
            vec![
                Token::Word("ls".into()),
                Token::Word("-l".into()),
                Token::PipeOp,
                Token::Word("wc".into()),
                Token::Word("-l".into()),
            ]
        );
    }

    #[test]
    fn empty_and_blank_input() {
        assert!(split_into_tokens("").is_empty());
        assert!(split_into_tokens(" \t  ").is_empty());
    }

    #[test]
    fn tabs_and_trailing_spaces() {
        let tokens = split_into_tokens("\tcd\t/tmp   ");
        assert_eq!(texts(&tokens), vec!["cd", "/tmp"]);
    }

    proptest! {
        #[test]
        fn words_never_empty_or_contain_separators(line in "[a-z |\t]{0,40}") {
            for token in split_into_tokens(&line) {
                match token {
                    Token::Word(w) => {
                        prop_assert!(!w.is_empty());
                        prop_assert!(!w.contains('|'));
                        prop_assert!(!w.chars().any(char::is_whitespace));
                    }
                    Token::PipeOp => {}
                }
            }
        }

        #[test]
        fn pipe_count_is_preserved(line in "[a-z |]{0,40}") {
            let pipes = split_into_tokens(&line)
                .iter()
                .filter(|t| **t == Token::PipeOp)
                .count();
            prop_assert_eq!(pipes, line.matches('|').count());
        }

        #[test]
        fn matches_split_whitespace_without_pipes(line in "[a-z0-9 \t-]{0,40}") {
            let tokens = split_into_tokens(&line);
            let expected: Vec<&str> = line.split_whitespace().collect();
            prop_assert_eq!(texts(&tokens), expected);
        }
    }
}
