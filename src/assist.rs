//! Writing-assist heuristics.
//!
//! These are plain string transformations keyed by a goal keyword. There is
//! no model inference and no outbound call; the provider tag recorded in
//! the audit trail is always "local". Output is deterministic except where
//! a goal explicitly draws a random suggestion or template.

use crate::db::{AiSession, Database, now_timestamp};
use crate::error::{AppError, Result};
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};

/// Transformation goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrichGoal {
    /// Tighten wording.
    Improve,
    /// Append a writing idea.
    Ideas,
    /// Pad sentences with connective phrasing.
    Expand,
    /// Fix common colloquial slips.
    Grammar,
    /// Normalize register.
    Style,
}

impl EnrichGoal {
    /// Keyword used in the API and the audit trail.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Improve => "improve",
            Self::Ideas => "ideas",
            Self::Expand => "expand",
            Self::Grammar => "grammar",
            Self::Style => "style",
        }
    }
}

/// Result of an enrich invocation.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichResult {
    /// Transformed text.
    pub enriched_text: String,
    /// Fixed per-goal confidence value.
    pub confidence: f64,
    /// Whitespace-split word count of the input.
    pub word_count_before: usize,
    /// Whitespace-split word count of the output.
    pub word_count_after: usize,
}

/// Result of a prompt-building invocation.
#[derive(Debug, Clone, Serialize)]
pub struct PromptResult {
    /// Assembled prompt.
    pub prompt: String,
    /// Generic writing suggestions, independent of the input.
    pub suggestions: Vec<&'static str>,
    /// Fixed confidence value.
    pub confidence: f64,
}

/// Optional context for prompt building.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PromptContext {
    /// Genre hint ("fantasia", "romance", ...).
    pub genre: Option<String>,
    /// Mood hint. Currently only recorded, not used for template choice.
    pub mood: Option<String>,
    /// Style hint. Currently only recorded, not used for template choice.
    pub style: Option<String>,
}

const IDEA_SUGGESTIONS: &[&str] = &[
    "E se um segredo do passado do protagonista viesse a tona neste momento?",
    "Considere introduzir um obstaculo inesperado que force uma escolha dificil.",
    "Uma mudanca de cenario pode dar novo folego a esta cena.",
    "Que tal revelar a motivacao oculta de um personagem secundario?",
];

const GENERIC_SUGGESTIONS: &[&str] = &[
    "Mostre, nao conte: troque adjetivos por acoes concretas.",
    "Varie o comprimento das frases para controlar o ritmo.",
    "Leia o trecho em voz alta para encontrar repeticoes.",
];

const FANTASY_TEMPLATES: &[&str] = &[
    "Descreva como a magia deste mundo reage ao que acontece em: ",
    "Explore as consequencias sobrenaturais da cena: ",
];

const ROMANCE_TEMPLATES: &[&str] = &[
    "Aprofunde a tensao entre os personagens em: ",
    "Explore o que fica nao dito entre eles em: ",
];

const DIALOGUE_TEMPLATES: &[&str] = &[
    "Continue este dialogo revelando o que cada um esconde: ",
    "Reescreva a conversa dando a cada voz um tom proprio: ",
];

const CHARACTER_TEMPLATES: &[&str] = &[
    "Aprofunde a motivacao do personagem central de: ",
    "Mostre o conflito interno do protagonista em: ",
];

const ACTION_TEMPLATES: &[&str] = &[
    "Intensifique o ritmo da acao em: ",
    "Descreva a cena de acao em camera lenta: ",
];

const EMOTION_TEMPLATES: &[&str] = &[
    "Traduza a emocao desta cena em sensacoes fisicas: ",
    "Amplie o peso emocional do momento em: ",
];

const DEFAULT_TEMPLATES: &[&str] = &[
    "Desenvolva a proxima cena a partir de: ",
    "Continue a narrativa mantendo o tom de: ",
];

/// How much of the input tail is carried into the assembled prompt.
const PROMPT_TAIL_CHARS: usize = 120;

/// How much of the input is kept in the audit row.
const EXCERPT_CHARS: usize = 200;

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn apply_improve(text: &str) -> String {
    text.replace("muito bom", "excelente")
        .replace("muito grande", "enorme")
        .replace("muito pequeno", "minusculo")
        .replace("coisa", "elemento")
        .replace("  ", " ")
}

fn apply_expand(text: &str) -> String {
    let expanded = text
        .replace(". ", ". Alem disso, ")
        .replace("mas ", "mas, por outro lado, ");
    format!("{} Em outras palavras, cada detalhe contribui para o todo.", expanded)
}

fn apply_grammar(text: &str) -> String {
    // Deterministic substitutions only; same input, same output.
    text.replace("mim ", "eu ")
        .replace("vc ", "voce ")
        .replace("pra ", "para ")
        .replace("tava ", "estava ")
        .replace("  ", " ")
}

fn apply_style(text: &str) -> String {
    text.replace("legal", "interessante")
        .replace("ok", "bem")
        .replace("a gente", "nos")
        .replace("!", ".")
}

fn apply_ideas(text: &str) -> String {
    let mut rng = rand::rng();
    let suggestion = IDEA_SUGGESTIONS
        .choose(&mut rng)
        .copied()
        .unwrap_or(IDEA_SUGGESTIONS[0]);
    format!("{}\n\n{}", text, suggestion)
}

/// Apply a goal transformation to the input text.
pub fn enrich_text(text: &str, goal: EnrichGoal) -> Result<EnrichResult> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("Input text is empty".to_string()));
    }

    let (enriched, confidence) = match goal {
        EnrichGoal::Improve => (apply_improve(trimmed), 0.7),
        EnrichGoal::Ideas => (apply_ideas(trimmed), 0.5),
        EnrichGoal::Expand => (apply_expand(trimmed), 0.6),
        EnrichGoal::Grammar => (apply_grammar(trimmed), 0.9),
        EnrichGoal::Style => (apply_style(trimmed), 0.6),
    };

    Ok(EnrichResult {
        word_count_before: word_count(trimmed),
        word_count_after: word_count(&enriched),
        enriched_text: enriched,
        confidence,
    })
}

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    let lower = text.to_lowercase();
    keywords.iter().any(|k| lower.contains(k))
}

fn pick_templates(text: &str, context: &PromptContext) -> &'static [&'static str] {
    match context.genre.as_deref() {
        Some("fantasia") | Some("fantasy") => return FANTASY_TEMPLATES,
        Some("romance") => return ROMANCE_TEMPLATES,
        _ => {}
    }

    if text.contains('"') || text.contains("disse") || text.contains('\u{2014}') {
        DIALOGUE_TEMPLATES
    } else if contains_any(text, &["personagem", "protagonista", "heroi", "ela ", "ele "]) {
        CHARACTER_TEMPLATES
    } else if contains_any(text, &["correu", "lutou", "atacou", "fugiu", "saltou"]) {
        ACTION_TEMPLATES
    } else if contains_any(text, &["medo", "amor", "raiva", "tristeza", "alegria"]) {
        EMOTION_TEMPLATES
    } else {
        DEFAULT_TEMPLATES
    }
}

fn tail(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    let skip = count - max_chars;
    match text.char_indices().nth(skip) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

/// Assemble a writing prompt from a template chosen by keyword detection
/// and the trailing slice of the input.
pub fn build_prompt(text: &str, context: &PromptContext) -> Result<PromptResult> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("Input text is empty".to_string()));
    }

    let templates = pick_templates(trimmed, context);
    let mut rng = rand::rng();
    let template = templates.choose(&mut rng).copied().unwrap_or(templates[0]);

    Ok(PromptResult {
        prompt: format!("{}{}", template, tail(trimmed, PROMPT_TAIL_CHARS)),
        suggestions: GENERIC_SUGGESTIONS.to_vec(),
        confidence: 0.5,
    })
}

fn excerpt(text: &str) -> String {
    let mut s: String = text.chars().take(EXCERPT_CHARS).collect();
    if text.chars().count() > EXCERPT_CHARS {
        s.push_str("...");
    }
    s
}

/// Record a heuristic invocation in the audit trail.
pub fn audit(
    db: &Database,
    user_id: &str,
    book_id: Option<&str>,
    chapter_id: Option<&str>,
    kind: &str,
    input: &str,
    output: &str,
) -> Result<()> {
    db.create_ai_session(&AiSession {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        book_id: book_id.map(str::to_string),
        chapter_id: chapter_id.map(str::to_string),
        provider: "local".to_string(),
        kind: kind.to_string(),
        prompt_excerpt: excerpt(input),
        output: output.to_string(),
        created_at: now_timestamp(),
    })
}
