//! Parsing and resolution of the `Range` request header.
//!
//! Parsing is deliberately lenient: a header we cannot make sense of
//! downgrades the request to a plain full-content response instead of
//! failing it. Seeking media players send well-formed single ranges; for
//! everything else the worst outcome of a parse failure is an ordinary
//! `200`, which every client understands.

use tracing::{debug, warn};

/// A parsed-but-unresolved `Range` header. Produced once per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpec {
    /// No range requested; serve the whole resource.
    None,
    /// `bytes=-n`: the last `n` bytes of the resource.
    Suffix(u64),
    /// `bytes=n-`: byte `n` through the end of the resource.
    From(u64),
    /// `bytes=n-m`: an explicit inclusive range.
    Bounded(u64, u64),
    /// The header was present but matched no form we understand.
    Unparseable,
}

/// A resolved inclusive byte window within a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteWindow {
    pub start: u64,
    pub end: u64,
}

impl ByteWindow {
    /// Number of bytes the window covers. Both bounds are inclusive, so
    /// `2-5` covers 4 bytes.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Outcome of resolving a [`RangeSpec`] against a resource size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Serve the entire resource with a `200`.
    Full,
    /// Serve the window with a `206` and a `Content-Range` header.
    Window(ByteWindow),
    /// The range cannot select any bytes; answer `416`.
    Unsatisfiable,
}

impl RangeSpec {
    /// Parse a raw `Range` header value.
    ///
    /// An absent or empty header means no range was requested. A header
    /// that does not start with `bytes=`, or whose remainder matches no
    /// supported form, degrades to a full response with a logged warning.
    /// Trailing text after a recognized range is ignored, so the first
    /// range of a multi-range request is honored and the rest dropped.
    pub fn parse(header: Option<&str>) -> RangeSpec {
        let Some(header) = header else {
            return RangeSpec::None;
        };
        if header.is_empty() {
            return RangeSpec::None;
        }

        let Some(spec) = header.strip_prefix("bytes=") else {
            warn!(header, "don't know how to parse Range header");
            return RangeSpec::None;
        };

        // Suffix form: the last n bytes, no explicit start.
        if let Some(rest) = spec.strip_prefix('-') {
            return match leading_u64(rest) {
                Some((n, _)) => {
                    debug!(suffix = n, "requested suffix range");
                    RangeSpec::Suffix(n)
                }
                None => {
                    warn!(header, "don't know how to parse Range header");
                    RangeSpec::Unparseable
                }
            };
        }

        let Some((from, rest)) = leading_u64(spec) else {
            warn!(header, "don't know how to parse Range header");
            return RangeSpec::Unparseable;
        };
        let Some(rest) = rest.strip_prefix('-') else {
            warn!(header, "don't know how to parse Range header");
            return RangeSpec::Unparseable;
        };

        match leading_u64(rest) {
            Some((to, _)) => {
                debug!(from, to, "requested bounded range");
                RangeSpec::Bounded(from, to)
            }
            // An open-ended range starting at zero asks for the whole
            // resource; answer it as a plain full response.
            None if from == 0 => RangeSpec::None,
            None => {
                debug!(from, "requested open-ended range");
                RangeSpec::From(from)
            }
        }
    }

    /// Resolve this spec against the resource size, snapshotted at the
    /// moment of resolution.
    ///
    /// A bounded range passes through verbatim: the declared end is not
    /// clamped to the resource size. The copy step reads only the bytes
    /// that actually exist, so an overshooting range yields a short body
    /// rather than an error.
    pub fn resolve(self, size: u64) -> Resolution {
        match self {
            RangeSpec::None | RangeSpec::Unparseable => Resolution::Full,
            // A zero-length suffix selects nothing.
            RangeSpec::Suffix(0) => Resolution::Unsatisfiable,
            // There are no byte offsets in an empty resource to slice.
            _ if size == 0 => Resolution::Full,
            RangeSpec::Bounded(from, to) if to < from => Resolution::Unsatisfiable,
            RangeSpec::Bounded(from, to) => Resolution::Window(ByteWindow { start: from, end: to }),
            RangeSpec::From(n) if n >= size => Resolution::Unsatisfiable,
            RangeSpec::From(n) => Resolution::Window(ByteWindow { start: n, end: size - 1 }),
            RangeSpec::Suffix(n) => Resolution::Window(ByteWindow {
                start: size.saturating_sub(n),
                end: size - 1,
            }),
        }
    }
}

/// Split a leading run of ASCII digits off `s` and parse it.
fn leading_u64(s: &str) -> Option<(u64, &str)> {
    let digits = s.len() - s.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }
    let (head, rest) = s.split_at(digits);
    head.parse().ok().map(|n| (n, rest))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::{ByteWindow, RangeSpec, Resolution};

    #[test]
    fn absent_or_empty_header_is_no_range() {
        assert_eq!(RangeSpec::None, RangeSpec::parse(None));
        assert_eq!(RangeSpec::None, RangeSpec::parse(Some("")));
    }

    #[test]
    fn foreign_unit_degrades_to_no_range() {
        assert_eq!(RangeSpec::None, RangeSpec::parse(Some("chars=0-10")));
        assert_eq!(RangeSpec::None, RangeSpec::parse(Some("0-10")));
    }

    #[test]
    fn simple_bounded_range() {
        assert_eq!(RangeSpec::Bounded(10, 20), RangeSpec::parse(Some("bytes=10-20")));
        assert_eq!(RangeSpec::Bounded(0, 0), RangeSpec::parse(Some("bytes=0-0")));
    }

    #[test]
    fn open_ended_range() {
        assert_eq!(RangeSpec::From(10), RangeSpec::parse(Some("bytes=10-")));
    }

    #[test]
    fn open_ended_range_from_zero_is_a_full_request() {
        assert_eq!(RangeSpec::None, RangeSpec::parse(Some("bytes=0-")));
    }

    #[test]
    fn suffix_range() {
        assert_eq!(RangeSpec::Suffix(20), RangeSpec::parse(Some("bytes=-20")));
    }

    #[test]
    fn garbage_after_bytes_prefix_is_unparseable() {
        assert_eq!(RangeSpec::Unparseable, RangeSpec::parse(Some("bytes=")));
        assert_eq!(RangeSpec::Unparseable, RangeSpec::parse(Some("bytes=abc")));
        assert_eq!(RangeSpec::Unparseable, RangeSpec::parse(Some("bytes=-")));
        assert_eq!(RangeSpec::Unparseable, RangeSpec::parse(Some("bytes=--5")));
        assert_eq!(RangeSpec::Unparseable, RangeSpec::parse(Some("bytes=10")));
    }

    #[test]
    fn first_range_of_a_multi_range_request_wins() {
        assert_eq!(
            RangeSpec::Bounded(0, 99),
            RangeSpec::parse(Some("bytes=0-99,200-299")),
        );
        // Trailing non-digit text after an open end is ignored the same way.
        assert_eq!(RangeSpec::From(10), RangeSpec::parse(Some("bytes=10-x")));
    }

    #[test]
    fn resolve_none_and_unparseable_serve_full() {
        assert_eq!(Resolution::Full, RangeSpec::None.resolve(100));
        assert_eq!(Resolution::Full, RangeSpec::Unparseable.resolve(100));
    }

    #[test]
    fn resolve_bounded_passes_through_verbatim() {
        assert_eq!(
            Resolution::Window(ByteWindow { start: 10, end: 20 }),
            RangeSpec::Bounded(10, 20).resolve(100),
        );
        // The end is not clamped to the resource size; the copier
        // truncates at EOF instead.
        assert_eq!(
            Resolution::Window(ByteWindow { start: 50, end: 2000 }),
            RangeSpec::Bounded(50, 2000).resolve(100),
        );
        assert_eq!(
            Resolution::Window(ByteWindow { start: 2000, end: 3000 }),
            RangeSpec::Bounded(2000, 3000).resolve(100),
        );
    }

    #[test]
    fn resolve_open_ended_runs_to_last_byte() {
        assert_eq!(
            Resolution::Window(ByteWindow { start: 10, end: 998 }),
            RangeSpec::From(10).resolve(999),
        );
    }

    #[test]
    fn resolve_suffix_counts_from_the_end() {
        assert_eq!(
            Resolution::Window(ByteWindow { start: 979, end: 998 }),
            RangeSpec::Suffix(20).resolve(999),
        );
        // A suffix longer than the resource selects all of it.
        assert_eq!(
            Resolution::Window(ByteWindow { start: 0, end: 9 }),
            RangeSpec::Suffix(100).resolve(10),
        );
    }

    #[test]
    fn resolve_rejects_inverted_and_empty_selections() {
        assert_eq!(Resolution::Unsatisfiable, RangeSpec::Bounded(30, 20).resolve(100));
        assert_eq!(Resolution::Unsatisfiable, RangeSpec::Suffix(0).resolve(100));
        assert_eq!(Resolution::Unsatisfiable, RangeSpec::From(100).resolve(100));
        assert_eq!(Resolution::Unsatisfiable, RangeSpec::From(500).resolve(100));
    }

    #[test]
    fn resolve_on_empty_resource_serves_full() {
        assert_eq!(Resolution::Full, RangeSpec::Bounded(0, 10).resolve(0));
        assert_eq!(Resolution::Full, RangeSpec::From(5).resolve(0));
        assert_eq!(Resolution::Full, RangeSpec::Suffix(5).resolve(0));
    }

    #[test]
    fn window_len_is_inclusive() {
        assert_matches!(
            RangeSpec::Bounded(2, 5).resolve(10),
            Resolution::Window(w) if w.len() == 4
        );
        assert_matches!(
            RangeSpec::Bounded(0, 0).resolve(10),
            Resolution::Window(w) if w.len() == 1
        );
    }
}
