//! Content validation and cleanup run before rendering.

use crate::models::content::{BlogPost, Content, SocialLink, StoryChunk, ValueItem};
use std::collections::HashSet;
use url::Url;

/// Errors and warnings collected while checking content.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Font Awesome class for a (lower-cased) social platform.
pub fn default_social_icon(platform: &str) -> &'static str {
    match platform {
        "twitter" => "fa-brands fa-twitter",
        "x" => "fa-brands fa-x-twitter",
        "linkedin" => "fa-brands fa-linkedin",
        "facebook" => "fa-brands fa-facebook",
        "github" => "fa-brands fa-github",
        "instagram" => "fa-brands fa-instagram",
        "youtube" => "fa-brands fa-youtube",
        "tiktok" => "fa-brands fa-tiktok",
        "pinterest" => "fa-brands fa-pinterest",
        "medium" => "fa-brands fa-medium",
        "dev" => "fa-brands fa-dev",
        "stackoverflow" => "fa-brands fa-stack-overflow",
        "dribbble" => "fa-brands fa-dribbble",
        "behance" => "fa-brands fa-behance",
        "mastodon" => "fa-brands fa-mastodon",
        "threads" => "fa-brands fa-threads",
        "email" => "fa-regular fa-envelope",
        "website" => "fa-solid fa-globe",
        "blog" => "fa-solid fa-blog",
        "portfolio" => "fa-solid fa-briefcase",
        "resume" => "fa-regular fa-file-lines",
        _ => "fa-solid fa-link",
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

/// Absolute URL with both a scheme and a host.
fn is_absolute_url(value: &str) -> bool {
    Url::parse(value).is_ok_and(|url| url.has_host())
}

pub fn validate_story_chunk(chunk: &StoryChunk, index: usize) -> ValidationReport {
    let mut report = ValidationReport::default();
    if is_blank(chunk.title.as_deref()) {
        report
            .errors
            .push(format!("Story chunk {index}: Missing title"));
    }
    if is_blank(chunk.content.as_deref()) {
        report
            .errors
            .push(format!("Story chunk {index}: Missing content"));
    }
    if let Some(image) = chunk.image.as_deref().filter(|i| !i.is_empty()) {
        if !is_absolute_url(image) {
            report
                .warnings
                .push(format!("Story chunk {index}: Invalid image URL format"));
        }
    }
    report
}

pub fn validate_value(value: &ValueItem, index: usize) -> ValidationReport {
    let mut report = ValidationReport::default();
    if is_blank(value.title.as_deref()) {
        report.errors.push(format!("Value {index}: Missing title"));
    }
    if is_blank(value.description.as_deref()) {
        report
            .errors
            .push(format!("Value {index}: Missing description"));
    }
    report
}

/// Checks a social link and normalizes it in place: the platform is
/// lower-cased and a missing icon is filled from [`default_social_icon`].
pub fn validate_social_link(link: &mut SocialLink, index: usize) -> ValidationReport {
    let mut report = ValidationReport::default();

    let platform = link
        .platform
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_lowercase);
    match platform {
        None => report
            .errors
            .push(format!("Social link {index}: Missing platform")),
        Some(platform) => {
            if is_blank(link.icon.as_deref()) {
                let icon = default_social_icon(&platform);
                report.warnings.push(format!(
                    "Social link {index}: Using default icon '{icon}' for platform '{platform}'"
                ));
                link.icon = Some(icon.to_string());
            }
            link.platform = Some(platform);
        }
    }

    match link.url.as_deref().filter(|u| !u.trim().is_empty()) {
        None => report.errors.push(format!("Social link {index}: Missing URL")),
        Some(url) if !is_absolute_url(url) => report
            .errors
            .push(format!("Social link {index}: Invalid URL format")),
        Some(_) => {}
    }

    report
}

/// Names of required fields that are missing: `bio.name`, `bio.summary` and
/// the profile and background image URLs.
pub fn missing_required(content: &Content) -> Vec<&'static str> {
    let mut missing = Vec::new();
    let bio = content.bio.as_ref();
    if is_blank(bio.and_then(|b| b.name.as_deref())) {
        missing.push("bio.name");
    }
    if is_blank(bio.and_then(|b| b.summary.as_deref())) {
        missing.push("bio.summary");
    }
    if is_blank(content.images.profile.as_ref().map(|i| i.url.as_str())) {
        missing.push("profile image URL");
    }
    if is_blank(content.images.background.as_ref().map(|i| i.url.as_str())) {
        missing.push("background image URL");
    }
    missing
}

/// Sort story chunks and values by `order_index` (stable) and drop invalid
/// list items, logging each one that is skipped.
pub fn clean_content(mut content: Content, user_id: &str) -> Content {
    content.story_chunks = keep_valid(content.story_chunks, user_id, "story chunk", |c, i| {
        validate_story_chunk(c, i)
    });
    content.story_chunks.sort_by_key(|c| c.order_index);

    content.values = keep_valid(content.values, user_id, "value", |v, i| validate_value(v, i));
    content.values.sort_by_key(|v| v.order_index);

    content.social_links = keep_valid(content.social_links, user_id, "social link", |l, i| {
        validate_social_link(l, i)
    });

    dedupe_slugs(&mut content.blogs, user_id);

    content
}

/// Give repeated blog slugs a numeric suffix so every post gets its own
/// page. Posts keep their order; the first one keeps the plain slug.
fn dedupe_slugs(posts: &mut [BlogPost], user_id: &str) {
    let mut taken: HashSet<String> = posts.iter().map(|p| p.slug.clone()).collect();
    let mut seen: HashSet<String> = HashSet::new();
    for post in posts.iter_mut() {
        if post.slug.is_empty() || seen.insert(post.slug.clone()) {
            continue;
        }
        let mut n = 2;
        let mut unique = format!("{}-{}", post.slug, n);
        while taken.contains(&unique) {
            n += 1;
            unique = format!("{}-{}", post.slug, n);
        }
        tracing::warn!(
            user_id,
            "Duplicate blog slug `{}`; publishing as `{}`",
            post.slug,
            unique
        );
        taken.insert(unique.clone());
        seen.insert(unique.clone());
        post.slug = unique;
    }
}

fn keep_valid<T>(
    items: Vec<T>,
    user_id: &str,
    what: &str,
    mut check: impl FnMut(&mut T, usize) -> ValidationReport,
) -> Vec<T> {
    items
        .into_iter()
        .enumerate()
        .filter_map(|(i, mut item)| {
            let report = check(&mut item, i);
            for warning in &report.warnings {
                tracing::debug!(user_id, "{} warning: {}", what, warning);
            }
            if report.is_valid() {
                Some(item)
            } else {
                tracing::warn!(
                    user_id,
                    "Skipping invalid {}: {}",
                    what,
                    report.errors.join("; ")
                );
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::content::{Bio, ImageRef};

    fn image(url: &str) -> Option<ImageRef> {
        Some(ImageRef {
            url: url.into(),
            alt: String::new(),
        })
    }

    fn complete_content() -> Content {
        let mut content = Content {
            bio: Some(Bio {
                name: Some("Ada".into()),
                summary: Some("Engineer".into()),
                ..Bio::default()
            }),
            ..Content::default()
        };
        content.images.profile = image("https://cdn.example.com/p.png");
        content.images.background = image("https://cdn.example.com/b.png");
        content
    }

    #[test]
    fn complete_content_is_valid() {
        let content = complete_content();
        assert!(missing_required(&content).is_empty());
    }

    #[test]
    fn reports_each_missing_required_field() {
        let mut content = complete_content();
        content.bio.as_mut().unwrap().summary = Some("  ".into());
        content.images.background = None;

        assert_eq!(
            missing_required(&content),
            vec!["bio.summary", "background image URL"]
        );

        assert_eq!(missing_required(&Content::default()).len(), 4);
    }

    #[test]
    fn social_links_get_default_icons() {
        let mut link = SocialLink {
            platform: Some("GitHub".into()),
            url: Some("https://github.com/ada".into()),
            icon: None,
        };
        let report = validate_social_link(&mut link, 0);
        assert!(report.is_valid());
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(link.platform.as_deref(), Some("github"));
        assert_eq!(link.icon.as_deref(), Some("fa-brands fa-github"));

        let mut unknown = SocialLink {
            platform: Some("gopher".into()),
            url: Some("https://gopher.example".into()),
            icon: None,
        };
        validate_social_link(&mut unknown, 1);
        assert_eq!(unknown.icon.as_deref(), Some("fa-solid fa-link"));
    }

    #[test]
    fn social_links_need_absolute_urls() {
        let mut relative = SocialLink {
            platform: Some("x".into()),
            url: Some("not a url".into()),
            icon: Some("i".into()),
        };
        assert!(!validate_social_link(&mut relative, 0).is_valid());

        let mut missing = SocialLink::default();
        let report = validate_social_link(&mut missing, 2);
        assert_eq!(
            report.errors,
            vec![
                "Social link 2: Missing platform".to_string(),
                "Social link 2: Missing URL".to_string()
            ]
        );
    }

    #[test]
    fn story_chunk_image_problems_are_warnings() {
        let chunk = StoryChunk {
            title: Some("Start".into()),
            content: Some("Once".into()),
            image: Some("/relative.png".into()),
            order_index: 0,
        };
        let report = validate_story_chunk(&chunk, 0);
        assert!(report.is_valid());
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn clean_sorts_and_drops_invalid_items() {
        let mut content = complete_content();
        content.story_chunks = vec![
            StoryChunk {
                title: Some("Second".into()),
                content: Some("b".into()),
                image: None,
                order_index: 2,
            },
            StoryChunk {
                title: None,
                content: Some("orphan".into()),
                image: None,
                order_index: 0,
            },
            StoryChunk {
                title: Some("First".into()),
                content: Some("a".into()),
                image: None,
                order_index: 1,
            },
        ];
        content.values = vec![
            ValueItem {
                title: Some("B".into()),
                description: Some("b".into()),
                icon: None,
                order_index: 5,
            },
            ValueItem {
                title: Some("A".into()),
                description: Some("a".into()),
                icon: None,
                order_index: 1,
            },
        ];
        content.social_links = vec![
            SocialLink {
                platform: Some("LinkedIn".into()),
                url: Some("https://linkedin.com/in/ada".into()),
                icon: None,
            },
            SocialLink {
                platform: Some("x".into()),
                url: None,
                icon: None,
            },
        ];

        let cleaned = clean_content(content, "u1");
        let titles: Vec<_> = cleaned
            .story_chunks
            .iter()
            .map(|c| c.title.clone().unwrap())
            .collect();
        assert_eq!(titles, vec!["First", "Second"]);
        assert_eq!(cleaned.values[0].title.as_deref(), Some("A"));
        assert_eq!(cleaned.social_links.len(), 1);
        assert_eq!(cleaned.social_links[0].platform.as_deref(), Some("linkedin"));
        assert_eq!(
            cleaned.social_links[0].icon.as_deref(),
            Some("fa-brands fa-linkedin")
        );
    }

    #[test]
    fn repeated_blog_slugs_get_suffixes() {
        let post = |title: &str, slug: &str| BlogPost {
            title: title.into(),
            slug: slug.into(),
            content: "body".into(),
            excerpt: None,
            thumbnail: None,
            tags: Vec::new(),
            published_at: None,
        };
        let mut content = complete_content();
        content.blogs = vec![
            post("Newest", "hello"),
            post("Taken", "hello-2"),
            post("Older", "hello"),
            post("Untitled", ""),
            post("Oldest", "hello"),
        ];

        let cleaned = clean_content(content, "u1");
        let slugs: Vec<_> = cleaned.blogs.iter().map(|p| p.slug.as_str()).collect();
        assert_eq!(slugs, vec!["hello", "hello-2", "hello-3", "", "hello-4"]);
        assert_eq!(cleaned.blogs[2].title, "Older");
    }
}
