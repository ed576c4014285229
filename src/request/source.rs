use std::fmt;

/// 图片来源。远程 URL 同时作为缓存键。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceRef {
    RemoteUrl(String),
    LocalName(String),
}

impl SourceRef {
    pub fn url(url: impl Into<String>) -> Self {
        Self::RemoteUrl(url.into())
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::LocalName(name.into())
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RemoteUrl(url) => write!(f, "{}", crate::fetch::redact_url_for_log(url)),
            Self::LocalName(name) => write!(f, "asset:{}", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_pick_variant() {
        assert_eq!(SourceRef::url("http://x/a.png"), SourceRef::RemoteUrl("http://x/a.png".to_string()));
        assert_eq!(SourceRef::named("logo"), SourceRef::LocalName("logo".to_string()));
    }

    #[test]
    fn display_redacts_query() {
        assert_eq!(SourceRef::url("http://x/a.png?sig=1").to_string(), "http://x/a.png");
        assert_eq!(SourceRef::named("logo").to_string(), "asset:logo");
    }
}
