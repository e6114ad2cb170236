use url::Url;

/// What kind of map asset a request is for. Drives cache keying and the
/// pinned-tile quota.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Style,
    Source,
    Tile,
    Glyphs,
    SpriteImage,
    SpriteJson,
}

impl ResourceKind {
    fn tag(self) -> &'static str {
        match self {
            Self::Style => "style",
            Self::Source => "source",
            Self::Tile => "tile",
            Self::Glyphs => "glyphs",
            Self::SpriteImage => "sprite-image",
            Self::SpriteJson => "sprite-json",
        }
    }
}

/// Scheduling tier for online dispatch. All `Regular` work is served
/// before any `Low` work; within a tier, arrival order holds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ResourcePriority {
    #[default]
    Regular,
    Low,
}

/// Whether the request is on behalf of an interactive map view or an
/// offline-region download.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ResourceUsage {
    #[default]
    Online,
    Offline,
}

/// One renderer-side asset request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resource {
    pub url: Url,
    pub kind: ResourceKind,
    pub priority: ResourcePriority,
    pub usage: ResourceUsage,
}

impl Resource {
    pub fn new(kind: ResourceKind, url: Url) -> Self {
        Self {
            url,
            kind,
            priority: ResourcePriority::default(),
            usage: ResourceUsage::default(),
        }
    }

    pub fn with_priority(mut self, priority: ResourcePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_usage(mut self, usage: ResourceUsage) -> Self {
        self.usage = usage;
        self
    }

    /// Stable cache key. Two resources with the same key are the same
    /// cached object regardless of priority or usage.
    pub fn cache_key(&self) -> String {
        format!("{}|{}", self.kind.tag(), self.url)
    }

    pub fn is_tile(&self) -> bool {
        self.kind == ResourceKind::Tile
    }
}
