//! @-mention extraction and rewriting
//!
//! A mention is a whitespace/punctuation-delimited token that starts with a
//! single `@`. The remainder is either a handle (matched case-insensitively)
//! or a full on-chain address. Resolved tokens are rewritten in place to a
//! profile link, `[@handle](<profile-url>/<address>)`; unresolved tokens are
//! left exactly as written.

use std::collections::{HashMap, HashSet};

use tracing::warn;

use crate::directory::{Account, Directory};

/// Length of the bech32 data part after `<prefix>1`
const ADDRESS_DATA_LEN: usize = 38;

/// A candidate mention located in a body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MentionToken {
    /// Byte range of the whole token including `@`
    pub start: usize,
    pub end: usize,
    /// Text after `@`
    pub name: String,
}

fn is_terminator(c: char) -> bool {
    matches!(c, ' ' | '\n' | '\r' | '.' | '(' | ')' | ':' | '!' | '?' | '\'' | '"')
        || c.is_whitespace()
        || c.is_control()
}

/// Find every `@name` token in `body`, in order
pub fn extract_mentions(body: &str) -> Vec<MentionToken> {
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;

    let flush = |start: usize, end: usize, tokens: &mut Vec<MentionToken>| {
        let word = &body[start..end];
        if let Some(name) = word.strip_prefix('@') {
            if !name.is_empty() && !name.contains('@') {
                tokens.push(MentionToken {
                    start,
                    end,
                    name: name.to_string(),
                });
            }
        }
    };

    for (i, c) in body.char_indices() {
        if is_terminator(c) {
            if let Some(s) = start.take() {
                flush(s, i, &mut tokens);
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        flush(s, body.len(), &mut tokens);
    }

    tokens
}

/// Undo profile-link rewriting for plain-text surfaces such as push bodies
pub fn plain_text(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut rest = body;

    while let Some(open) = rest.find("[@") {
        let after_open = &rest[open + 1..];
        let link = after_open
            .find("](")
            .and_then(|close| after_open[close + 2..].find(')').map(|paren| (close, close + 2 + paren)));

        match link {
            Some((close, paren)) if !after_open[..close].contains(char::is_whitespace) => {
                out.push_str(&rest[..open]);
                out.push_str(&after_open[..close]);
                rest = &after_open[paren + 1..];
            }
            _ => {
                out.push_str(&rest[..open + 2]);
                rest = &rest[open + 2..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// The rewritten body and the accounts it mentions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub body: String,
    /// Distinct accounts in order of first mention
    pub recipients: Vec<Account>,
}

/// Resolves mention tokens against the [`Directory`]
#[derive(Debug, Clone)]
pub struct MentionResolver {
    profile_url: String,
    address_prefix: String,
}

impl MentionResolver {
    pub fn new(profile_url: impl Into<String>, address_prefix: impl Into<String>) -> Self {
        Self {
            profile_url: profile_url.into().trim_end_matches('/').to_string(),
            address_prefix: address_prefix.into(),
        }
    }

    /// Whether a token names an on-chain address rather than a handle
    pub fn is_address(&self, name: &str) -> bool {
        name.strip_prefix(self.address_prefix.as_str())
            .and_then(|rest| rest.strip_prefix('1'))
            .map(|data| {
                data.len() == ADDRESS_DATA_LEN
                    && data.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
            })
            .unwrap_or(false)
    }

    fn link(&self, account: &Account) -> String {
        format!("[@{}]({}/{})", account.handle, self.profile_url, account.address)
    }

    /// Resolve every mention in `body`
    ///
    /// Lookup failures leave the token unresolved; they never fail the call.
    pub async fn resolve(&self, directory: &dyn Directory, body: &str) -> Resolution {
        let tokens = extract_mentions(body);
        if tokens.is_empty() {
            return Resolution {
                body: body.to_string(),
                recipients: Vec::new(),
            };
        }

        let mut lookups: HashMap<String, Option<Account>> = HashMap::new();
        for token in &tokens {
            let key = token.name.to_lowercase();
            if lookups.contains_key(&key) {
                continue;
            }
            let result = if self.is_address(&token.name) {
                directory.account_by_address(&token.name).await
            } else {
                directory.account_by_handle(&key).await
            };
            let account = result.unwrap_or_else(|e| {
                warn!(mention = %token.name, error = %e, "Mention lookup failed");
                None
            });
            lookups.insert(key, account);
        }

        let mut rewritten = String::with_capacity(body.len());
        let mut recipients = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = 0;

        for token in &tokens {
            let Some(Some(account)) = lookups.get(&token.name.to_lowercase()) else {
                continue;
            };
            rewritten.push_str(&body[cursor..token.start]);
            rewritten.push_str(&self.link(account));
            cursor = token.end;

            if seen.insert(account.id) {
                recipients.push(account.clone());
            }
        }
        rewritten.push_str(&body[cursor..]);

        Resolution {
            body: rewritten,
            recipients,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::db::{Database, SqliteDirectory};
    use std::sync::Arc;

    fn names(body: &str) -> Vec<String> {
        extract_mentions(body).into_iter().map(|t| t.name).collect()
    }

    fn chain_address() -> String {
        format!("cosmos1{}", "q".repeat(38))
    }

    fn directory() -> SqliteDirectory {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let seed = format!(
            "INSERT INTO accounts (id, username, address) VALUES
                (1, 'bob', 'cosmos1bob'), (2, 'carol', 'cosmos1carol'), (3, 'dana', '{}');",
            chain_address()
        );
        db.with_conn(|conn| {
            conn.execute_batch(&seed)?;
            Ok(())
        })
        .unwrap();
        SqliteDirectory::new(db)
    }

    fn handles(resolution: &Resolution) -> Vec<&str> {
        resolution.recipients.iter().map(|a| a.handle.as_str()).collect()
    }

    #[test]
    fn test_extract_respects_terminators() {
        assert_eq!(names("thanks @alice and @bob."), vec!["alice", "bob"]);
        assert_eq!(names("(@carol): @dave! @eve? '@frank'"), vec!["carol", "dave", "eve", "frank"]);
        assert_eq!(names("line\n@gina\r\n"), vec!["gina"]);
    }

    #[test]
    fn test_extract_ignores_non_mentions() {
        assert!(names("mail me at bob@example.com").is_empty());
        assert!(names("@@bob and @ alone").is_empty());
        assert!(names("no mentions here").is_empty());
    }

    #[test]
    fn test_token_ranges() {
        let body = "hi @bob!";
        let token = &extract_mentions(body)[0];
        assert_eq!(&body[token.start..token.end], "@bob");
    }

    #[test]
    fn test_is_address() {
        let resolver = MentionResolver::new("https://app/profile", "cosmos");
        let address = format!("cosmos1{}", "q".repeat(38));
        assert!(resolver.is_address(&address));
        assert!(!resolver.is_address("cosmos1short"));
        assert!(!resolver.is_address(&format!("cosmos1{}", "Q".repeat(38))));
        assert!(!resolver.is_address("alice"));
    }

    #[test]
    fn test_plain_text() {
        assert_eq!(
            plain_text("hi [@bob](https://app/profile/cosmos1bob), see [docs](x)"),
            "hi @bob, see [docs](x)"
        );
        assert_eq!(plain_text("broken [@bob]("), "broken [@bob](");
        assert_eq!(plain_text("nothing"), "nothing");
    }

    #[tokio::test]
    async fn test_terminator_only_bodies_mention_nobody() {
        let resolver = MentionResolver::new("https://app/profile", "cosmos");
        let directory = directory();

        for body in [" .():!?'\"\r\n", "@ . @\n"] {
            assert!(extract_mentions(body).is_empty(), "{:?}", body);
            let resolution = resolver.resolve(&directory, body).await;
            assert_eq!(resolution.body, body);
            assert!(resolution.recipients.is_empty());
        }
    }

    #[tokio::test]
    async fn test_case_variants_dedupe_in_first_seen_order() {
        let resolver = MentionResolver::new("https://app/profile", "cosmos");
        let resolution = resolver
            .resolve(&directory(), "@Bob then @carol then @bob")
            .await;

        assert_eq!(handles(&resolution), vec!["bob", "carol"]);
        assert_eq!(
            resolution.body,
            "[@bob](https://app/profile/cosmos1bob) then \
             [@carol](https://app/profile/cosmos1carol) then \
             [@bob](https://app/profile/cosmos1bob)"
        );
    }

    #[tokio::test]
    async fn test_address_mention_resolves_by_address() {
        let resolver = MentionResolver::new("https://app/profile/", "cosmos");
        let address = chain_address();
        let body = format!("ping @{}! and @nobody", address);

        let resolution = resolver.resolve(&directory(), &body).await;

        assert_eq!(handles(&resolution), vec!["dana"]);
        assert_eq!(
            resolution.body,
            format!("ping [@dana](https://app/profile/{})! and @nobody", address)
        );
    }
}
