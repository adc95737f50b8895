//! Approved user content that feeds the renderer.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything a site is rendered from.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Content {
    pub bio: Option<Bio>,
    pub images: Images,
    /// Newest first.
    pub blogs: Vec<BlogPost>,
    pub videos: Vec<Video>,
    pub story_chunks: Vec<StoryChunk>,
    pub values: Vec<ValueItem>,
    pub social_links: Vec<SocialLink>,
    pub style: Option<StyleProfile>,
}

impl Content {
    /// True when no section holds anything.
    pub fn is_empty(&self) -> bool {
        self.bio.is_none()
            && self.images.is_empty()
            && self.blogs.is_empty()
            && self.videos.is_empty()
            && self.story_chunks.is_empty()
            && self.values.is_empty()
            && self.social_links.is_empty()
            && self.style.is_none()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Bio {
    pub name: Option<String>,
    pub headline: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub expertise: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ImageRef {
    pub url: String,
    pub alt: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Images {
    pub profile: Option<ImageRef>,
    pub background: Option<ImageRef>,
    pub banner: Option<ImageRef>,
    pub logo: Option<ImageRef>,
}

impl Images {
    pub fn is_empty(&self) -> bool {
        self.profile.is_none()
            && self.background.is_none()
            && self.banner.is_none()
            && self.logo.is_none()
    }

    /// Slot for an image kind as stored in the content tables.
    pub fn slot_mut(&mut self, kind: &str) -> Option<&mut Option<ImageRef>> {
        match kind {
            "profile" | "headshot" => Some(&mut self.profile),
            "background" => Some(&mut self.background),
            "banner" => Some(&mut self.banner),
            "logo" => Some(&mut self.logo),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct BlogPost {
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: Option<String>,
    pub thumbnail: Option<String>,
    pub tags: Vec<String>,
    pub published_at: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Video {
    pub title: String,
    pub url: String,
    pub kind: Option<String>,
    pub thumbnail: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct StoryChunk {
    pub title: Option<String>,
    pub content: Option<String>,
    pub image: Option<String>,
    pub order_index: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ValueItem {
    pub title: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub order_index: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct SocialLink {
    pub platform: Option<String>,
    pub url: Option<String>,
    pub icon: Option<String>,
}

/// Brand colors (name → hex) and fonts (name → family).
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct StyleProfile {
    pub colors: BTreeMap<String, String>,
    pub typography: BTreeMap<String, String>,
}
