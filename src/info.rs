use std::fmt::{Display, Formatter};
use std::time::SystemTime;

/// The severity of an [Info] record
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum InfoKind {
    Info,
    Warning,
    Error,
}

/// A structured info / warning / error record. This is the vehicle for reporting problems to
///  application code: Components report an `Info` through their delegate rather than returning
///  an error, and application code decides what to make of it.
///
/// The `domain` identifies the reporting component (e.g. [crate::socket::SOCKET_INFO_DOMAIN]),
///  and `code` is meaningful only in the context of its domain. An `Info` can wrap another
///  `Info` that caused it.
#[derive(Debug, Clone, PartialEq)]
pub struct Info {
    pub kind: InfoKind,
    pub domain: &'static str,
    pub code: i32,
    pub context: Option<String>,
    pub timestamp: SystemTime,
    pub sub_info: Option<Box<Info>>,
}

impl Info {
    pub fn new(kind: InfoKind, domain: &'static str, code: impl Into<i32>) -> Info {
        Info {
            kind,
            domain,
            code: code.into(),
            context: None,
            timestamp: SystemTime::now(),
            sub_info: None,
        }
    }

    pub fn error(domain: &'static str, code: impl Into<i32>) -> Info {
        Info::new(InfoKind::Error, domain, code)
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Info {
        self.context = Some(context.into());
        self
    }

    pub fn with_sub_info(mut self, sub_info: Info) -> Info {
        self.sub_info = Some(Box::new(sub_info));
        self
    }

    /// convenience for matching an info against a domain-specific code enum
    pub fn is(&self, domain: &str, code: impl Into<i32>) -> bool {
        self.domain == domain && self.code == code.into()
    }
}

impl Display for Info {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} {}#{}", self.kind, self.domain, self.code)?;
        if let Some(context) = &self.context {
            write!(f, ": {}", context)?;
        }
        Ok(())
    }
}

impl std::error::Error for Info {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.sub_info.as_deref()
            .map(|i| i as &(dyn std::error::Error + 'static))
    }
}
