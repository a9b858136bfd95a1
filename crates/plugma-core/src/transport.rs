//! Client-side transport selectors.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ProtocolError;

/// One of the message-passing channels a context can use.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportTag {
    /// The embedded frame's messaging channel.
    Iframe,
    /// The enclosing frame's messaging channel.
    Parent,
    /// The context's own message channel.
    Window,
    /// The persistent relay socket.
    Ws,
}

impl TransportTag {
    /// Wire name of the tag.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Iframe => "iframe",
            Self::Parent => "parent",
            Self::Window => "window",
            Self::Ws => "ws",
        }
    }
}

impl fmt::Display for TransportTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportTag {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "iframe" => Ok(Self::Iframe),
            "parent" => Ok(Self::Parent),
            "window" => Ok(Self::Window),
            "ws" | "socket" => Ok(Self::Ws),
            other => Err(ProtocolError::UnknownTransport(other.to_owned())),
        }
    }
}

/// An ordered selection of transports, given singly or as a list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Via(Vec<TransportTag>);

impl Via {
    /// Iterate the selected tags in order.
    pub fn iter(&self) -> impl Iterator<Item = TransportTag> + '_ {
        self.0.iter().copied()
    }

    /// Whether `tag` is part of the selection.
    pub fn contains(&self, tag: TransportTag) -> bool {
        self.0.contains(&tag)
    }
}

impl Default for Via {
    fn default() -> Self {
        Self(vec![TransportTag::Ws])
    }
}

impl From<TransportTag> for Via {
    fn from(tag: TransportTag) -> Self {
        Self(vec![tag])
    }
}

impl From<Vec<TransportTag>> for Via {
    fn from(tags: Vec<TransportTag>) -> Self {
        Self(tags)
    }
}

impl<const N: usize> From<[TransportTag; N]> for Via {
    fn from(tags: [TransportTag; N]) -> Self {
        Self(tags.to_vec())
    }
}

impl FromStr for Via {
    type Err = ProtocolError;

    /// Parse `"ws"` or a comma-separated list such as `"ws,window"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split(',')
            .map(|part| part.trim().parse())
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_tags() {
        assert_eq!("iframe".parse::<TransportTag>().unwrap(), TransportTag::Iframe);
        assert_eq!("parent".parse::<TransportTag>().unwrap(), TransportTag::Parent);
        assert_eq!("window".parse::<TransportTag>().unwrap(), TransportTag::Window);
        assert_eq!("ws".parse::<TransportTag>().unwrap(), TransportTag::Ws);
        assert_eq!("socket".parse::<TransportTag>().unwrap(), TransportTag::Ws);
        assert!("smoke".parse::<TransportTag>().is_err());
    }

    #[test]
    fn default_via_is_socket() {
        assert_eq!(Via::default().iter().collect::<Vec<_>>(), vec![TransportTag::Ws]);
    }

    #[test]
    fn via_keeps_order() {
        let via: Via = "window, ws ,parent".parse().unwrap();
        assert_eq!(
            via.iter().collect::<Vec<_>>(),
            vec![TransportTag::Window, TransportTag::Ws, TransportTag::Parent]
        );
        assert!(via.contains(TransportTag::Parent));
        assert!(!via.contains(TransportTag::Iframe));
    }

    #[test]
    fn via_from_array_and_single() {
        let single: Via = TransportTag::Iframe.into();
        assert_eq!(single.iter().count(), 1);
        let pair: Via = [TransportTag::Ws, TransportTag::Window].into();
        assert_eq!(pair.iter().count(), 2);
    }
}
