use super::SqlError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Keyword {
    Select,
    From,
    Where,
    Group,
    Order,
    By,
    Having,
    Limit,
    As,
    And,
    Or,
    Asc,
    Desc,
    Distinct,
}

pub(crate) fn keyword(ident: &str) -> Option<Keyword> {
    match ident.to_lowercase().as_str() {
        "select" => Some(Keyword::Select),
        "from" => Some(Keyword::From),
        "where" => Some(Keyword::Where),
        "group" => Some(Keyword::Group),
        "order" => Some(Keyword::Order),
        "by" => Some(Keyword::By),
        "having" => Some(Keyword::Having),
        "limit" => Some(Keyword::Limit),
        "as" => Some(Keyword::As),
        "and" => Some(Keyword::And),
        "or" => Some(Keyword::Or),
        "asc" => Some(Keyword::Asc),
        "desc" => Some(Keyword::Desc),
        "distinct" => Some(Keyword::Distinct),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Keyword(Keyword),
    Ident(String),
    /// `"name"` or `` `name` ``
    QuotedIdent(String),
    Number(f64),
    /// `'text'`
    Str(String),
    Op(String),
    Star,
    LParen,
    RParen,
    Comma,
    Dot,
    Semicolon,
    /// Text outside the understood subset (`::`, `||`, `?`, `[`, ...)
    Other(String),
}

/// A token with its byte range in the source text.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub token: Token,
    pub start: usize,
    pub end: usize,
}

pub(crate) fn tokenize(input: &str) -> Result<Vec<Spanned>, SqlError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        let token = match c {
            c if c.is_whitespace() => {
                chars.next();
                continue;
            }
            '-' if input[start..].starts_with("--") => {
                while let Some(&(_, nc)) = chars.peek() {
                    if nc == '\n' {
                        break;
                    }
                    chars.next();
                }
                continue;
            }
            '/' if input[start..].starts_with("/*") => {
                chars.next();
                chars.next();
                let mut prev = '\0';
                for (_, nc) in chars.by_ref() {
                    if prev == '*' && nc == '/' {
                        break;
                    }
                    prev = nc;
                }
                continue;
            }
            ',' => {
                chars.next();
                Token::Comma
            }
            '(' => {
                chars.next();
                Token::LParen
            }
            ')' => {
                chars.next();
                Token::RParen
            }
            '.' if !matches!(input[start + 1..].chars().next(), Some(d) if d.is_ascii_digit()) => {
                chars.next();
                Token::Dot
            }
            ';' => {
                chars.next();
                Token::Semicolon
            }
            '*' => {
                chars.next();
                Token::Star
            }
            '\'' => {
                // '' inside a literal is an escaped quote
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    if c == '\'' {
                        if matches!(chars.peek(), Some(&(_, '\''))) {
                            value.push('\'');
                            chars.next();
                        } else {
                            closed = true;
                            break;
                        }
                    } else {
                        value.push(c);
                    }
                }
                if !closed {
                    return Err(SqlError::Unterminated("string"));
                }
                Token::Str(value)
            }
            '"' | '`' => {
                let quote = c;
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    if c == quote {
                        if matches!(chars.peek(), Some(&(_, q)) if q == quote) {
                            value.push(quote);
                            chars.next();
                        } else {
                            closed = true;
                            break;
                        }
                    } else {
                        value.push(c);
                    }
                }
                if !closed {
                    return Err(SqlError::Unterminated("identifier"));
                }
                Token::QuotedIdent(value)
            }
            '=' | '<' | '>' | '!' | '+' | '-' | '/' | '%' => {
                let mut op = c.to_string();
                chars.next();
                if let Some(&(_, next_c)) = chars.peek() {
                    if (c == '<' && (next_c == '=' || next_c == '>'))
                        || (c == '>' && next_c == '=')
                        || (c == '!' && next_c == '=')
                    {
                        op.push(next_c);
                        chars.next();
                    }
                }
                if op == "!" {
                    Token::Other(op)
                } else {
                    Token::Op(op)
                }
            }
            '0'..='9' | '.' => {
                let mut end = start;
                let mut seen_exp = false;
                while let Some(&(i, nc)) = chars.peek() {
                    let is_exp_sign = seen_exp
                        && (nc == '+' || nc == '-')
                        && matches!(input[..i].chars().last(), Some('e' | 'E'));
                    if nc.is_ascii_digit() || nc == '.' || is_exp_sign {
                        end = i + nc.len_utf8();
                        chars.next();
                    } else if (nc == 'e' || nc == 'E') && !seen_exp {
                        seen_exp = true;
                        end = i + 1;
                        chars.next();
                    } else {
                        break;
                    }
                }
                let text = &input[start..end];
                match text.parse::<f64>() {
                    Ok(n) => Token::Number(n),
                    Err(_) => Token::Other(text.to_string()),
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut end = start;
                while let Some(&(i, nc)) = chars.peek() {
                    if nc.is_alphanumeric() || nc == '_' || nc == '$' {
                        end = i + nc.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let ident = &input[start..end];
                match keyword(ident) {
                    Some(k) => Token::Keyword(k),
                    None => Token::Ident(ident.to_string()),
                }
            }
            _ => {
                chars.next();
                Token::Other(c.to_string())
            }
        };
        let end = chars.peek().map(|&(i, _)| i).unwrap_or(input.len());
        tokens.push(Spanned { token, start, end });
    }
    Ok(tokens)
}

/// Source text covered by `tokens`, or an empty string for an empty slice.
pub(crate) fn span_text<'a>(input: &'a str, tokens: &[Spanned]) -> &'a str {
    match (tokens.first(), tokens.last()) {
        (Some(first), Some(last)) => input[first.start..last.end].trim(),
        _ => "",
    }
}

/// Splits at `delimiter` tokens that are not nested inside parentheses.
pub(crate) fn split_top_level<'a>(tokens: &'a [Spanned], delimiter: &Token) -> Vec<&'a [Spanned]> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut current_start = 0;
    for (i, spanned) in tokens.iter().enumerate() {
        match spanned.token {
            Token::LParen => depth += 1,
            Token::RParen => depth -= 1,
            _ => {}
        }
        if depth == 0 && &spanned.token == delimiter {
            parts.push(&tokens[current_start..i]);
            current_start = i + 1;
        }
    }
    parts.push(&tokens[current_start..]);
    parts
}

/// Column reference: `name`, `"name"` or `table.name`; returns the column part.
pub(crate) fn column_ref(tokens: &[Spanned]) -> Option<String> {
    let ident = |t: &Token| match t {
        Token::Ident(s) | Token::QuotedIdent(s) => Some(s.clone()),
        _ => None,
    };
    match tokens {
        [single] => ident(&single.token),
        [table, dot, column] if dot.token == Token::Dot => {
            ident(&table.token)?;
            ident(&column.token)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<Token> {
        tokenize(input).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn test_tokenize_simple() {
        assert_eq!(
            kinds("SELECT a, SUM(b) FROM t WHERE a >= 10"),
            vec![
                Token::Keyword(Keyword::Select),
                Token::Ident("a".to_string()),
                Token::Comma,
                Token::Ident("SUM".to_string()),
                Token::LParen,
                Token::Ident("b".to_string()),
                Token::RParen,
                Token::Keyword(Keyword::From),
                Token::Ident("t".to_string()),
                Token::Keyword(Keyword::Where),
                Token::Ident("a".to_string()),
                Token::Op(">=".to_string()),
                Token::Number(10.0),
            ]
        );
    }

    #[test]
    fn test_tokenize_quoted_literals_hide_keywords() {
        assert_eq!(
            kinds("x = 'Group by ''this'' order'"),
            vec![
                Token::Ident("x".to_string()),
                Token::Op("=".to_string()),
                Token::Str("Group by 'this' order".to_string()),
            ]
        );
        assert_eq!(
            kinds("\"Order Date\" <> `from`"),
            vec![
                Token::QuotedIdent("Order Date".to_string()),
                Token::Op("<>".to_string()),
                Token::QuotedIdent("from".to_string()),
            ]
        );
    }

    #[test]
    fn test_tokenize_numbers_and_dots() {
        assert_eq!(
            kinds("t.a > .5 AND b < 1e3"),
            vec![
                Token::Ident("t".to_string()),
                Token::Dot,
                Token::Ident("a".to_string()),
                Token::Op(">".to_string()),
                Token::Number(0.5),
                Token::Keyword(Keyword::And),
                Token::Ident("b".to_string()),
                Token::Op("<".to_string()),
                Token::Number(1000.0),
            ]
        );
    }

    #[test]
    fn test_spans_cover_source() {
        let input = "SELECT  REGION FROM t";
        let tokens = tokenize(input).unwrap();
        assert_eq!(span_text(input, &tokens[1..2]), "REGION");
        assert_eq!(span_text(input, &tokens), input);
    }

    #[test]
    fn test_tokenize_errors() {
        assert_eq!(
            tokenize("a = 'open").unwrap_err(),
            SqlError::Unterminated("string")
        );
    }

    #[test]
    fn test_unknown_characters_become_other() {
        assert_eq!(
            kinds("a::FLOAT || ? [b]"),
            vec![
                Token::Ident("a".to_string()),
                Token::Other(":".to_string()),
                Token::Other(":".to_string()),
                Token::Ident("FLOAT".to_string()),
                Token::Other("|".to_string()),
                Token::Other("|".to_string()),
                Token::Other("?".to_string()),
                Token::Other("[".to_string()),
                Token::Ident("b".to_string()),
                Token::Other("]".to_string()),
            ]
        );
        assert_eq!(kinds("a ! b")[1], Token::Other("!".to_string()));
        assert_eq!(kinds("\u{2018}x\u{2019}")[0], Token::Other("\u{2018}".to_string()));
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(
            kinds("-- customer's revenue\nSELECT a /* it's */ - 1"),
            vec![
                Token::Keyword(Keyword::Select),
                Token::Ident("a".to_string()),
                Token::Op("-".to_string()),
                Token::Number(1.0),
            ]
        );
        assert_eq!(kinds("a /* never closed"), vec![Token::Ident("a".to_string())]);
    }

    #[test]
    fn test_split_top_level_respects_parens() {
        let input = "a, SUM(b, c), d";
        let tokens = tokenize(input).unwrap();
        let parts: Vec<&str> = split_top_level(&tokens, &Token::Comma)
            .into_iter()
            .map(|p| span_text(input, p))
            .collect();
        assert_eq!(parts, vec!["a", "SUM(b, c)", "d"]);
    }

    #[test]
    fn test_column_ref_shapes() {
        let tokens = tokenize("s.\"Unit Price\"").unwrap();
        assert_eq!(column_ref(&tokens), Some("Unit Price".to_string()));
        let tokens = tokenize("a + b").unwrap();
        assert_eq!(column_ref(&tokens), None);
    }
}
