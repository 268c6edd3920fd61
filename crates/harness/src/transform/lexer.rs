//! 세그먼트 렉서
//!
//! 파이프라인 설정 세그먼트를 평탄한 토큰 스트림으로 분해합니다.
//! 설정 언어 전체를 파싱하지 않으며, `id => value` 추출에 필요한 만큼만 인식합니다.
//!
//! # 토큰 규칙
//! - `{`, `}`: 중괄호
//! - `=>`: 대입 화살표 (단독 `=`는 bare word)
//! - `"..."`, `'...'`: 따옴표 문자열, 백슬래시 이스케이프 처리, 반드시 닫혀야 함
//! - `#`부터 줄 끝까지: 주석, 토큰을 만들지 않음
//! - bare word: 공백, `=`, 따옴표, 중괄호, `#`을 제외한 연속 문자

use std::fmt;

/// 렉서 토큰
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    OpenBrace,
    CloseBrace,
    Arrow,
    /// 따옴표를 벗겨내고 이스케이프를 해석한 문자열
    Quoted(String),
    Word(String),
}

impl Token {
    /// bare word이면 그 텍스트를 반환합니다.
    pub fn as_word(&self) -> Option<&str> {
        match self {
            Self::Word(w) => Some(w),
            _ => None,
        }
    }

    /// 값으로 쓸 수 있는 토큰(문자열 또는 bare word)의 텍스트를 반환합니다.
    pub fn as_value(&self) -> Option<&str> {
        match self {
            Self::Quoted(s) | Self::Word(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenBrace => f.write_str("{"),
            Self::CloseBrace => f.write_str("}"),
            Self::Arrow => f.write_str("=>"),
            Self::Quoted(s) => write!(f, "{s:?}"),
            Self::Word(w) => f.write_str(w),
        }
    }
}

/// 렉서 에러
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LexError {
    /// 닫히지 않은 따옴표 문자열
    #[error("unterminated {quote} string starting at byte {offset}")]
    UnterminatedQuote {
        /// 여는 따옴표 문자
        quote: char,
        /// 여는 따옴표의 바이트 오프셋
        offset: usize,
    },
}

/// 세그먼트 텍스트를 토큰 스트림으로 분해합니다.
pub fn tokenize(input: &str) -> Result<Vec<Token>, LexError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(offset, ch)) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '#' => {
                while chars.next_if(|&(_, c)| c != '\n').is_some() {}
            }
            '{' => {
                chars.next();
                tokens.push(Token::OpenBrace);
            }
            '}' => {
                chars.next();
                tokens.push(Token::CloseBrace);
            }
            '=' => {
                chars.next();
                if matches!(chars.peek(), Some(&(_, '>'))) {
                    chars.next();
                    tokens.push(Token::Arrow);
                } else {
                    tokens.push(Token::Word("=".to_owned()));
                }
            }
            '"' | '\'' => {
                chars.next();
                let mut value = String::new();
                let mut escaped = false;
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    if escaped {
                        value.push(c);
                        escaped = false;
                    } else if c == '\\' {
                        escaped = true;
                    } else if c == ch {
                        closed = true;
                        break;
                    } else {
                        value.push(c);
                    }
                }
                if !closed {
                    return Err(LexError::UnterminatedQuote { quote: ch, offset });
                }
                tokens.push(Token::Quoted(value));
            }
            _ => {
                let mut word = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_whitespace() || matches!(c, '=' | '"' | '\'' | '{' | '}' | '#') {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(w: &str) -> Token {
        Token::Word(w.to_owned())
    }

    fn quoted(s: &str) -> Token {
        Token::Quoted(s.to_owned())
    }

    #[test]
    fn tokenize_plugin_declaration() {
        let tokens = tokenize(r#"stdin { id => "in" }"#).unwrap();
        assert_eq!(
            tokens,
            vec![
                word("stdin"),
                Token::OpenBrace,
                word("id"),
                Token::Arrow,
                quoted("in"),
                Token::CloseBrace,
            ]
        );
    }

    #[test]
    fn arrow_without_spaces() {
        let tokens = tokenize("id=>main").unwrap();
        assert_eq!(tokens, vec![word("id"), Token::Arrow, word("main")]);
    }

    #[test]
    fn lone_equals_is_word() {
        let tokens = tokenize("a = b").unwrap();
        assert_eq!(tokens, vec![word("a"), word("="), word("b")]);
    }

    #[test]
    fn single_quotes_and_escapes() {
        let tokens = tokenize(r#"'it\'s' "say \"hi\"""#).unwrap();
        assert_eq!(tokens, vec![quoted("it's"), quoted(r#"say "hi""#)]);
    }

    #[test]
    fn quotes_may_contain_braces_and_arrows() {
        let tokens = tokenize(r#"match => "{ id => x }""#).unwrap();
        assert_eq!(
            tokens,
            vec![word("match"), Token::Arrow, quoted("{ id => x }")]
        );
    }

    #[test]
    fn comments_are_skipped() {
        let tokens = tokenize("elasticsearch {\n  # don't index drafts\n  id => \"es\" # trailing\n}").unwrap();
        assert_eq!(
            tokens,
            vec![
                word("elasticsearch"),
                Token::OpenBrace,
                word("id"),
                Token::Arrow,
                quoted("es"),
                Token::CloseBrace,
            ]
        );
    }

    #[test]
    fn hash_inside_quotes_is_not_a_comment() {
        let tokens = tokenize(r#"id => "a#b""#).unwrap();
        assert_eq!(tokens, vec![word("id"), Token::Arrow, quoted("a#b")]);
    }

    #[test]
    fn unterminated_quote_fails() {
        let err = tokenize(r#"id => "never closed"#).unwrap_err();
        assert_eq!(
            err,
            LexError::UnterminatedQuote {
                quote: '"',
                offset: 6
            }
        );
    }

    #[test]
    fn trailing_backslash_leaves_quote_open() {
        assert!(tokenize(r#""abc\""#).is_err());
    }

    #[test]
    fn words_stop_at_quotes_and_braces() {
        let tokens = tokenize(r#"a"b"c{d}"#).unwrap();
        assert_eq!(
            tokens,
            vec![
                word("a"),
                quoted("b"),
                word("c"),
                Token::OpenBrace,
                word("d"),
                Token::CloseBrace,
            ]
        );
    }

    #[test]
    fn empty_input_has_no_tokens() {
        assert!(tokenize("  \n\t ").unwrap().is_empty());
    }

    #[test]
    fn display_round_trips_words() {
        assert_eq!(Token::Arrow.to_string(), "=>");
        assert_eq!(quoted("x").to_string(), "\"x\"");
    }
}
