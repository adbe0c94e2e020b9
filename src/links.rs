use crate::error::{ClientError, Result};
use regex::Regex;
use std::sync::OnceLock;

const SUPPORTED_PREFIX: &str = "https://vipergirls.to";

fn thread_pattern() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"https://vipergirls\.to/threads/(\d+)((.*p=)(\d+))?").expect("static regex"))
}

/// A forum thread link, optionally pointing at one post in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadLink {
  pub url: String,
  pub thread_id: String,
  pub post_id: Option<String>,
}

impl ThreadLink {
  pub fn parse(raw: &str) -> Result<Self> {
    let url = raw.trim();
    if !url.starts_with(SUPPORTED_PREFIX) {
      return Err(ClientError::InvalidLink(url.to_string()));
    }
    let caps = thread_pattern()
      .captures(url)
      .ok_or_else(|| ClientError::InvalidLink(url.to_string()))?;
    Ok(Self {
      url: url.to_string(),
      thread_id: caps[1].to_string(),
      post_id: caps.get(4).map(|m| m.as_str().to_string()),
    })
  }

  /// One link per line. Blank lines and other hosts are skipped; a forum
  /// link without a thread id fails the whole batch.
  pub fn parse_many(input: &str) -> Result<Vec<Self>> {
    let mut links = Vec::new();
    for line in input.lines().map(str::trim).filter(|l| !l.is_empty()) {
      if !line.starts_with(SUPPORTED_PREFIX) {
        tracing::warn!(url = line, "unsupported link skipped");
        continue;
      }
      links.push(Self::parse(line)?);
    }
    Ok(links)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn thread_and_post_ids() {
    let link = ThreadLink::parse("https://vipergirls.to/threads/123456-Some-Title?p=987654&viewfull=1#post987654").unwrap();
    assert_eq!(link.thread_id, "123456");
    assert_eq!(link.post_id.as_deref(), Some("987654"));

    let bare = ThreadLink::parse(" https://vipergirls.to/threads/42-x ").unwrap();
    assert_eq!(bare.url, "https://vipergirls.to/threads/42-x");
    assert_eq!(bare.post_id, None);
  }

  #[test]
  fn other_hosts_are_rejected() {
    assert!(matches!(ThreadLink::parse("https://example.com/threads/1"), Err(ClientError::InvalidLink(_))));
    assert!(ThreadLink::parse("https://vipergirls.to/forums/7").is_err());
  }

  #[test]
  fn parse_many_skips_blanks_and_foreign_hosts() {
    let input = "https://vipergirls.to/threads/1\r\n\n   \nhttp://elsewhere.net/threads/2\nhttps://vipergirls.to/threads/3?p=4\n";
    let links = ThreadLink::parse_many(input).unwrap();
    let ids: Vec<(&str, Option<&str>)> = links.iter().map(|l| (l.thread_id.as_str(), l.post_id.as_deref())).collect();
    assert_eq!(ids, vec![("1", None), ("3", Some("4"))]);
  }

  #[test]
  fn parse_many_fails_on_forum_link_without_thread() {
    assert!(ThreadLink::parse_many("https://vipergirls.to/threads/1\nhttps://vipergirls.to/members/9").is_err());
  }
}
