// Paging cursors. Each in-flight load is identified by a token so a late
// completion can be recognized and dropped.

/// Monotonic source of context tokens shared by every async operation the
/// controller dispatches.
#[derive(Debug, Default)]
pub struct TokenSource {
    last: u64,
}

impl TokenSource {
    pub fn next(&mut self) -> u64 {
        self.last = self.last.wrapping_add(1);
        self.last
    }
}

/// Opaque-marker cursor used for scroll-back history and for the room list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerCursor {
    has_more: bool,
    marker: Option<String>,
    in_flight: Option<u64>,
}

impl Default for MarkerCursor {
    fn default() -> Self {
        Self::new(None, true)
    }
}

impl MarkerCursor {
    pub fn new(marker: Option<String>, has_more: bool) -> Self {
        Self {
            has_more,
            marker,
            in_flight: None,
        }
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn marker(&self) -> Option<&str> {
        self.marker.as_deref()
    }

    /// Starts a load. `None` when exhausted or when a load is already running.
    pub fn begin(&mut self, token: u64) -> Option<Option<String>> {
        if !self.has_more || self.in_flight.is_some() {
            return None;
        }
        self.in_flight = Some(token);
        Some(self.marker.clone())
    }

    /// Settles the load identified by `token`. Returns `false` for stale tokens,
    /// in which case nothing changes.
    pub fn complete(&mut self, token: u64, next_marker: Option<String>, has_more: bool) -> bool {
        if self.in_flight != Some(token) {
            return false;
        }
        self.in_flight = None;
        self.has_more = has_more;
        if next_marker.is_some() {
            self.marker = next_marker;
        }
        true
    }

    /// A failed load leaves the cursor where it was so the user can try again.
    pub fn fail(&mut self, token: u64) -> bool {
        if self.in_flight != Some(token) {
            return false;
        }
        self.in_flight = None;
        true
    }

    pub fn reset(&mut self, marker: Option<String>, has_more: bool) {
        *self = Self::new(marker, has_more);
    }
}

/// Offset cursor for one active search query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetCursor {
    query: String,
    next_offset: u32,
    page_size: u32,
    has_more: bool,
    in_flight: Option<(u64, u32)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub token: u64,
    pub query: String,
    pub offset: u32,
    pub limit: u32,
}

impl OffsetCursor {
    pub fn new(query: impl Into<String>, page_size: u32) -> Self {
        Self {
            query: query.into(),
            next_offset: 0,
            page_size: page_size.max(1),
            has_more: true,
            in_flight: None,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn next_offset(&self) -> u32 {
        self.next_offset
    }

    pub fn begin(&mut self, token: u64) -> Option<PageRequest> {
        if !self.has_more || self.in_flight.is_some() {
            return None;
        }
        self.in_flight = Some((token, self.next_offset));
        Some(PageRequest {
            token,
            query: self.query.clone(),
            offset: self.next_offset,
            limit: self.page_size,
        })
    }

    /// Accepts a page only if it answers the outstanding request for this query.
    pub fn complete(&mut self, token: u64, query: &str, received: u32, has_more: bool) -> bool {
        let Some((expected, offset)) = self.in_flight else {
            return false;
        };
        if expected != token || query != self.query {
            return false;
        }
        self.in_flight = None;
        self.next_offset = offset + received;
        self.has_more = has_more && received > 0;
        true
    }

    pub fn fail(&mut self, token: u64) -> bool {
        match self.in_flight {
            Some((expected, _)) if expected == token => {
                self.in_flight = None;
                true
            }
            _ => false,
        }
    }
}
