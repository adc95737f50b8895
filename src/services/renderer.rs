//! Site renderer: content + style profile → a set of HTML pages and a CSS file.
//!
//! Rendering is a pure function. No clock, randomness or environment is read,
//! so the same input always yields byte-identical output.

use crate::models::content::{BlogPost, Content, StyleProfile};
use bytes::Bytes;
use chrono::{DateTime, NaiveDate};
use minijinja::{Environment, Value, context};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

const DEFAULT_COLOR: &str = "#000000";
const DEFAULT_FONT: &str = "system-ui";
const DEFAULT_TRUNCATE_WORDS: usize = 50;
const HOME_BLOG_COUNT: usize = 3;
const HOME_VIDEO_COUNT: usize = 2;

/// Color names always present in the generated stylesheet.
const BASE_COLORS: [&str; 5] = ["primary", "secondary", "accent", "background", "text"];
/// Font roles always present in the generated stylesheet.
const BASE_FONTS: [&str; 2] = ["heading", "body"];

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("content invalid: {0}")]
    Validation(String),
    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),
}

/// Rendered site files keyed by relative path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Artifact {
    files: BTreeMap<String, Bytes>,
}

impl Artifact {
    pub fn insert(&mut self, path: impl Into<String>, body: impl Into<Bytes>) {
        self.files.insert(path.into(), body.into());
    }

    pub fn get(&self, path: &str) -> Option<&Bytes> {
        self.files.get(path)
    }

    /// Files in path order.
    pub fn files(&self) -> impl Iterator<Item = (&str, &Bytes)> {
        self.files.iter().map(|(path, body)| (path.as_str(), body))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// MD5 over every path and body, in path order.
    pub fn checksum(&self) -> String {
        let mut digest = md5::Context::new();
        for (path, body) in &self.files {
            digest.consume(path.as_bytes());
            digest.consume([0u8]);
            digest.consume((body.len() as u64).to_le_bytes());
            digest.consume(body);
        }
        format!("{:x}", digest.compute())
    }
}

#[derive(Debug, Clone, Serialize)]
struct NavItem {
    title: &'static str,
    url: String,
}

#[derive(Debug, Clone, Serialize)]
struct PostView<'a> {
    title: &'a str,
    content: &'a str,
    excerpt: Option<&'a str>,
    thumbnail: Option<&'a str>,
    tags: &'a [String],
    published_at: Option<&'a str>,
    /// Link to the post page, relative to the site root.
    href: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct CssVar {
    name: String,
    value: String,
}

/// Template engine holding the embedded site templates.
pub struct SiteRenderer {
    env: Environment<'static>,
}

impl SiteRenderer {
    pub fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.add_template("base.html", BASE_TEMPLATE)?;
        env.add_template("home.html", HOME_TEMPLATE)?;
        env.add_template("about.html", ABOUT_TEMPLATE)?;
        env.add_template("blog_index.html", BLOG_INDEX_TEMPLATE)?;
        env.add_template("blog_post.html", BLOG_POST_TEMPLATE)?;
        env.add_template("videos.html", VIDEOS_TEMPLATE)?;
        env.add_template("story.html", STORY_TEMPLATE)?;
        env.add_template("custom.css", STYLE_TEMPLATE)?;
        env.add_filter("format_date", format_date);
        env.add_filter("truncate_words", truncate_words);
        Ok(Self { env })
    }

    /// Render every page of the site.
    ///
    /// Sections without content are left out, including their navigation
    /// entries. Fails only if `bio.name` or `bio.summary` is missing.
    pub fn render(&self, content: &Content, style: &StyleProfile) -> Result<Artifact, RenderError> {
        let bio = content
            .bio
            .as_ref()
            .ok_or_else(|| RenderError::Validation("missing bio".into()))?;
        let name = non_blank(bio.name.as_deref())
            .ok_or_else(|| RenderError::Validation("missing bio.name".into()))?;
        let summary = non_blank(bio.summary.as_deref())
            .ok_or_else(|| RenderError::Validation("missing bio.summary".into()))?;

        let posts: Vec<PostView> = content.blogs.iter().map(post_view).collect();
        let mut artifact = Artifact::default();

        let common = |root: &str, page_title: &str, page_description: &str| {
            context! {
                root => Value::from_safe_string(root.to_string()),
                site_title => name,
                page_title => page_title,
                page_description => page_description,
                logo => &content.images.logo,
                navigation => navigation(content, root),
                social_links => &content.social_links,
            }
        };

        let home = context! {
            bio => bio,
            banner => content.images.banner.as_ref().or(content.images.background.as_ref()),
            background => &content.images.background,
            profile => &content.images.profile,
            latest_blogs => &posts[..posts.len().min(HOME_BLOG_COUNT)],
            featured_videos => &content.videos[..content.videos.len().min(HOME_VIDEO_COUNT)],
            story_preview => content.story_chunks.first(),
            ..common("", "Welcome", summary)
        };
        artifact.insert("index.html", self.page("home.html", home)?);

        let about = context! {
            bio => bio,
            profile => &content.images.profile,
            values => &content.values,
            ..common("", "About Me", bio.headline.as_deref().unwrap_or(""))
        };
        artifact.insert("about.html", self.page("about.html", about)?);

        if !posts.is_empty() {
            let blog_index = context! {
                posts => &posts,
                ..common("../", "Blog", "Latest thoughts and insights")
            };
            artifact.insert("blog/index.html", self.page("blog_index.html", blog_index)?);

            for (post, source) in posts.iter().zip(&content.blogs) {
                if post.href.is_none() {
                    continue;
                }
                let page = context! {
                    post => post,
                    author => name,
                    author_image => &content.images.profile,
                    ..common("../", &source.title, source.excerpt.as_deref().unwrap_or(""))
                };
                artifact.insert(
                    format!("blog/{}.html", source.slug),
                    self.page("blog_post.html", page)?,
                );
            }
        }

        if !content.videos.is_empty() {
            let videos = context! {
                videos => &content.videos,
                ..common("", "Videos", "Watch my latest content")
            };
            artifact.insert("videos.html", self.page("videos.html", videos)?);
        }

        if !content.story_chunks.is_empty() {
            let story = context! {
                story_chunks => &content.story_chunks,
                values => &content.values,
                bio => bio,
                ..common("", "My Story", "Journey, experiences, and values that shape who I am")
            };
            artifact.insert("story.html", self.page("story.html", story)?);
        }

        let css = self.env.get_template("custom.css")?.render(context! {
            colors => css_vars(&style.colors, &BASE_COLORS, DEFAULT_COLOR, sanitize_color),
            fonts => css_vars(&style.typography, &BASE_FONTS, DEFAULT_FONT, sanitize_font),
        })?;
        artifact.insert("static/css/custom.css", css);

        Ok(artifact)
    }

    fn page(&self, template: &str, ctx: Value) -> Result<String, RenderError> {
        Ok(self.env.get_template(template)?.render(ctx)?)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn is_safe_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
}

fn post_view(post: &BlogPost) -> PostView<'_> {
    PostView {
        title: &post.title,
        content: &post.content,
        excerpt: post.excerpt.as_deref(),
        thumbnail: post.thumbnail.as_deref(),
        tags: &post.tags,
        published_at: post.published_at.as_deref(),
        href: is_safe_slug(&post.slug).then(|| format!("blog/{}.html", post.slug)),
    }
}

fn navigation(content: &Content, root: &str) -> Vec<NavItem> {
    let mut nav = vec![
        NavItem {
            title: "Home",
            url: format!("{root}index.html"),
        },
        NavItem {
            title: "About",
            url: format!("{root}about.html"),
        },
    ];
    if !content.blogs.is_empty() {
        nav.push(NavItem {
            title: "Blog",
            url: format!("{root}blog/index.html"),
        });
    }
    if !content.videos.is_empty() {
        nav.push(NavItem {
            title: "Videos",
            url: format!("{root}videos.html"),
        });
    }
    if !content.story_chunks.is_empty() {
        nav.push(NavItem {
            title: "My Story",
            url: format!("{root}story.html"),
        });
    }
    nav
}

/// Merge user values over defaults for the base names. Names and values are
/// sanitized; entries that fail sanitizing fall back to (or are dropped for)
/// the default.
fn css_vars(
    user: &BTreeMap<String, String>,
    base: &[&str],
    default: &str,
    sanitize: fn(&str) -> Option<String>,
) -> Vec<CssVar> {
    let mut vars: BTreeMap<String, String> = base
        .iter()
        .map(|name| (name.to_string(), default.to_string()))
        .collect();
    for (name, value) in user {
        let name = name.trim().to_ascii_lowercase();
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            continue;
        }
        if let Some(value) = sanitize(value) {
            vars.insert(name, value);
        }
    }
    vars.into_iter()
        .map(|(name, value)| CssVar { name, value })
        .collect()
}

fn sanitize_color(value: &str) -> Option<String> {
    let value = value.trim();
    let hex = value.strip_prefix('#')?;
    (matches!(hex.len(), 3 | 4 | 6 | 8) && hex.chars().all(|c| c.is_ascii_hexdigit()))
        .then(|| value.to_ascii_lowercase())
}

fn sanitize_font(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '_' | ',' | '"' | '\'')))
    .then(|| value.to_string())
}

/// `2024-01-02T…` or `2024-01-02` → `January 02, 2024`; anything else is
/// returned unchanged.
fn format_date(value: String) -> String {
    if let Ok(dt) = DateTime::parse_from_rfc3339(&value) {
        return dt.format("%B %d, %Y").to_string();
    }
    if let Ok(date) = NaiveDate::parse_from_str(&value, "%Y-%m-%d") {
        return date.format("%B %d, %Y").to_string();
    }
    value
}

fn truncate_words(value: String, length: Option<usize>) -> String {
    let length = length.unwrap_or(DEFAULT_TRUNCATE_WORDS);
    let words: Vec<&str> = value.split_whitespace().collect();
    if words.len() <= length {
        return value;
    }
    format!("{}...", words[..length].join(" "))
}

const BASE_TEMPLATE: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>{{ page_title }} | {{ site_title }}</title>
  {% if page_description %}<meta name="description" content="{{ page_description }}">{% endif %}
  <link rel="stylesheet" href="{{ root }}static/css/custom.css">
</head>
<body>
  <header class="site-header">
    <a class="brand" href="{{ root }}index.html">
      {% if logo and logo.url %}<img src="{{ logo.url }}" alt="{{ logo.alt }}">{% endif %}
      <span>{{ site_title }}</span>
    </a>
    <nav>
      <ul>
      {% for item in navigation %}
        <li><a href="{{ item.url }}">{{ item.title }}</a></li>
      {% endfor %}
      </ul>
    </nav>
  </header>
  <main>
    {% block content %}{% endblock %}
  </main>
  <footer class="site-footer">
    {% if social_links %}
    <ul class="social-links">
      {% for link in social_links %}
      <li><a href="{{ link.url }}" rel="me noopener"><i class="{{ link.icon }}"></i><span>{{ link.platform }}</span></a></li>
      {% endfor %}
    </ul>
    {% endif %}
    <p>&copy; {{ site_title }}</p>
  </footer>
</body>
</html>
"##;

const HOME_TEMPLATE: &str = r##"{% extends "base.html" %}
{% block content %}
<section class="hero"{% if banner %} style="background-image: url('{{ banner.url }}')"{% endif %}>
  {% if profile %}<img class="headshot" src="{{ profile.url }}" alt="{{ profile.alt }}">{% endif %}
  <h1>{{ bio.name }}</h1>
  {% if bio.headline %}<p class="headline">{{ bio.headline }}</p>{% endif %}
  <p class="summary">{{ bio.summary }}</p>
</section>
{% if story_preview %}
<section class="story-preview">
  <h2>{{ story_preview.title }}</h2>
  <p>{{ story_preview.content | truncate_words(40) }}</p>
  <a href="{{ root }}story.html">Read my story</a>
</section>
{% endif %}
{% if latest_blogs %}
<section class="latest-blogs">
  <h2>Latest posts</h2>
  {% for post in latest_blogs %}
  <article>
    <h3>{% if post.href %}<a href="{{ root }}{{ post.href }}">{{ post.title }}</a>{% else %}{{ post.title }}{% endif %}</h3>
    {% if post.published_at %}<time>{{ post.published_at | format_date }}</time>{% endif %}
    <p>{{ post.excerpt or (post.content | truncate_words(30)) }}</p>
  </article>
  {% endfor %}
</section>
{% endif %}
{% if featured_videos %}
<section class="featured-videos">
  <h2>Featured videos</h2>
  {% for video in featured_videos %}
  <a class="video" href="{{ video.url }}">
    {% if video.thumbnail %}<img src="{{ video.thumbnail }}" alt="{{ video.title }}">{% endif %}
    <span>{{ video.title }}</span>
  </a>
  {% endfor %}
</section>
{% endif %}
{% endblock %}
"##;

const ABOUT_TEMPLATE: &str = r##"{% extends "base.html" %}
{% block content %}
<section class="about">
  {% if profile %}<img class="headshot" src="{{ profile.url }}" alt="{{ profile.alt }}">{% endif %}
  <h1>{{ bio.name }}</h1>
  {% if bio.headline %}<p class="headline">{{ bio.headline }}</p>{% endif %}
  <p>{{ bio.summary }}</p>
  {% if bio.content %}<div class="bio-content">{{ bio.content }}</div>{% endif %}
  {% if bio.expertise %}
  <ul class="expertise">
    {% for item in bio.expertise %}<li>{{ item }}</li>{% endfor %}
  </ul>
  {% endif %}
</section>
{% if values %}
<section class="values">
  <h2>What I value</h2>
  {% for value in values %}
  <div class="value">
    {% if value.icon %}<i class="{{ value.icon }}"></i>{% endif %}
    <h3>{{ value.title }}</h3>
    <p>{{ value.description }}</p>
  </div>
  {% endfor %}
</section>
{% endif %}
{% endblock %}
"##;

const BLOG_INDEX_TEMPLATE: &str = r##"{% extends "base.html" %}
{% block content %}
<section class="blog-index">
  <h1>Blog</h1>
  {% for post in posts %}
  <article>
    {% if post.thumbnail %}<img src="{{ post.thumbnail }}" alt="{{ post.title }}">{% endif %}
    <h2>{% if post.href %}<a href="{{ root }}{{ post.href }}">{{ post.title }}</a>{% else %}{{ post.title }}{% endif %}</h2>
    {% if post.published_at %}<time>{{ post.published_at | format_date }}</time>{% endif %}
    <p>{{ post.excerpt or (post.content | truncate_words) }}</p>
  </article>
  {% endfor %}
</section>
{% endblock %}
"##;

const BLOG_POST_TEMPLATE: &str = r##"{% extends "base.html" %}
{% block content %}
<article class="blog-post">
  <h1>{{ post.title }}</h1>
  <p class="byline">
    {% if author_image %}<img src="{{ author_image.url }}" alt="{{ author_image.alt }}">{% endif %}
    <span>{{ author }}</span>
    {% if post.published_at %}<time>{{ post.published_at | format_date }}</time>{% endif %}
  </p>
  <div class="post-content">{{ post.content }}</div>
  {% if post.tags %}
  <ul class="tags">{% for tag in post.tags %}<li>{{ tag }}</li>{% endfor %}</ul>
  {% endif %}
  <a href="{{ root }}blog/index.html">All posts</a>
</article>
{% endblock %}
"##;

const VIDEOS_TEMPLATE: &str = r##"{% extends "base.html" %}
{% block content %}
<section class="videos">
  <h1>Videos</h1>
  {% for video in videos %}
  <article class="video">
    <a href="{{ video.url }}">
      {% if video.thumbnail %}<img src="{{ video.thumbnail }}" alt="{{ video.title }}">{% endif %}
      <h2>{{ video.title }}</h2>
    </a>
    {% if video.description %}<p>{{ video.description }}</p>{% endif %}
  </article>
  {% endfor %}
</section>
{% endblock %}
"##;

const STORY_TEMPLATE: &str = r##"{% extends "base.html" %}
{% block content %}
<section class="story">
  <h1>My Story</h1>
  {% for chunk in story_chunks %}
  <article class="story-chunk">
    <h2>{{ chunk.title }}</h2>
    {% if chunk.image %}<img src="{{ chunk.image }}" alt="{{ chunk.title }}">{% endif %}
    <p>{{ chunk.content }}</p>
  </article>
  {% endfor %}
</section>
{% if values %}
<section class="values">
  <h2>What drives {{ bio.name }}</h2>
  <ul>{% for value in values %}<li><strong>{{ value.title }}</strong> {{ value.description }}</li>{% endfor %}</ul>
</section>
{% endif %}
{% endblock %}
"##;

const STYLE_TEMPLATE: &str = r##":root {
{% for color in colors %}  --color-{{ color.name }}: {{ color.value }};
{% endfor %}{% for font in fonts %}  --font-{{ font.name }}: {{ font.value }};
{% endfor %}}

body {
  margin: 0;
  font-family: var(--font-body);
  color: var(--color-text);
  background: var(--color-background);
}

h1, h2, h3 {
  font-family: var(--font-heading);
  color: var(--color-primary);
}

a {
  color: var(--color-accent);
}

.site-header, .site-footer {
  display: flex;
  justify-content: space-between;
  padding: 1rem 2rem;
  background: var(--color-secondary);
}

.hero {
  padding: 4rem 2rem;
  background-size: cover;
  background-position: center;
}

.headshot {
  width: 160px;
  height: 160px;
  border-radius: 50%;
  object-fit: cover;
}
"##;
