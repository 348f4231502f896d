//! LilyPond template rendering
//!
//! The generator produces the music (staves and voices); the document around
//! it comes from a Mustache template.
//!
//! - `Score`: header block with title and composer, `\score` with layout and
//!   optional MIDI output (`score.ly.mustache`)
//! - `Minimal`: version, language and the music only (`minimal.ly.mustache`)
//!
//! Templates contain no Scheme expressions.

use serde::Serialize;

/// Template selection for LilyPond output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LilyPondTemplate {
    Minimal,
    Score,
}

/// Context data for template rendering
///
/// Optional texts come with a flag, Mustache sections being driven by
/// booleans only.
#[derive(Debug, Clone, Serialize)]
pub struct TemplateContext {
    /// LilyPond version (e.g., "2.24.0")
    pub version: String,
    /// Note name language (e.g., "nederlands")
    pub language: String,
    pub has_header: bool,
    pub has_title: bool,
    pub title: String,
    pub has_composer: bool,
    pub composer: String,
    pub midi: bool,
    /// Musical content: staff groups, staves and voices
    pub staves: String,
}

impl TemplateContext {
    pub fn new(version: String, language: String, staves: String) -> Self {
        Self {
            version,
            language,
            has_header: false,
            has_title: false,
            title: String::new(),
            has_composer: false,
            composer: String::new(),
            midi: false,
            staves,
        }
    }

    pub fn builder(version: String, language: String, staves: String) -> TemplateContextBuilder {
        TemplateContextBuilder {
            context: TemplateContext::new(version, language, staves),
        }
    }
}

/// Builder for TemplateContext
pub struct TemplateContextBuilder {
    context: TemplateContext,
}

impl TemplateContextBuilder {
    /// Set the title, already escaped for LilyPond
    pub fn title(mut self, title: Option<String>) -> Self {
        if let Some(title) = title {
            self.context.has_title = true;
            self.context.has_header = true;
            self.context.title = title;
        }
        self
    }

    /// Set the composer, already escaped for LilyPond
    pub fn composer(mut self, composer: Option<String>) -> Self {
        if let Some(composer) = composer {
            self.context.has_composer = true;
            self.context.has_header = true;
            self.context.composer = composer;
        }
        self
    }

    pub fn midi(mut self, midi: bool) -> Self {
        self.context.midi = midi;
        self
    }

    pub fn build(self) -> TemplateContext {
        self.context
    }
}

pub fn get_template_content(template_type: LilyPondTemplate) -> &'static str {
    match template_type {
        LilyPondTemplate::Minimal => include_str!("templates/minimal.ly.mustache"),
        LilyPondTemplate::Score => include_str!("templates/score.ly.mustache"),
    }
}

/// Render a LilyPond document using a template
pub fn render_lilypond(
    template_type: LilyPondTemplate,
    context: &TemplateContext,
) -> Result<String, Box<dyn std::error::Error>> {
    let template_content = get_template_content(template_type);
    let template = mustache::compile_str(template_content)?;
    Ok(template.render_to_string(context)?)
}
