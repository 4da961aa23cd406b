//! Story viewer pages.

use std::collections::BTreeMap;

use minijinja::{context, Environment};

use vitrine_compiler::EmittedFile;
use vitrine_static::StoryCollectionMetadata;

const STORY_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>{{ story.title }} | vitrine</title>
  <style>
    body { font-family: system-ui, sans-serif; margin: 2rem; }
    .story-items { color: #555; }
  </style>
</head>
<body>
  <h1>{{ story.title }}</h1>
  <ul class="story-items">
  {%- for item in story.storyItems %}
    <li data-symbol="{{ item.symbol }}">{{ item.symbol }}{% if item.isDefaultExport %} (default){% endif %}</li>
  {%- endfor %}
  </ul>
  <div id="vitrine-root"></div>
  <script type="module">
    const modules = [];
  {%- for file in scripts %}
    modules.push(await import({{ file.url | tojson }}));
  {%- endfor %}
    window.vitrineStory = { key: {{ story.fileName | tojson }}, modules };
  </script>
</body>
</html>
"#;

const INDEX_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>vitrine</title>
  <style>body { font-family: system-ui, sans-serif; margin: 2rem; }</style>
</head>
<body>
  <h1>Stories</h1>
  {%- if not ready %}
  <p>Compiling...</p>
  {%- endif %}
  <ul>
  {%- for key, story in stories|items %}
    <li><a href="/app/story/{{ key }}">{{ story.title }}</a> ({{ story.storyItems|length }})</li>
  {%- endfor %}
  </ul>
</body>
</html>
"#;

/// Renders the viewer pages.
pub struct Viewer {
    env: Environment<'static>,
}

impl Viewer {
    pub fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.add_template("index.html", INDEX_TEMPLATE)?;
        env.add_template("story.html", STORY_TEMPLATE)?;
        Ok(Self { env })
    }

    /// Render the story index.
    pub fn render_index(
        &self,
        stories: &BTreeMap<String, StoryCollectionMetadata>,
        ready: bool,
    ) -> Result<String, minijinja::Error> {
        self.env.get_template("index.html")?.render(context! {
            stories => stories,
            ready => ready,
        })
    }

    /// Render the page for one story file. Only JavaScript files are loaded.
    pub fn render_story(
        &self,
        story: &StoryCollectionMetadata,
        files: &[EmittedFile],
    ) -> Result<String, minijinja::Error> {
        let scripts: Vec<&EmittedFile> = files
            .iter()
            .filter(|f| f.name.ends_with(".js") || f.name.ends_with(".mjs"))
            .collect();

        self.env.get_template("story.html")?.render(context! {
            story => story,
            scripts => scripts,
        })
    }
}
