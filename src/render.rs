//! Renderizado de enlaces en línea `[texto](destino)` dentro del texto del chat.
//!
//! Cada línea se procesa de forma independiente y sin estado: el resultado es
//! una lista ordenada de segmentos de texto plano y de enlace que, al volver a
//! insertar `[`, `](` y `)` alrededor de los enlaces, reconstruye la línea.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// El texto termina en el primer `](`, así que puede contener corchetes
/// sueltos; el destino termina en el primer `)`.
static INLINE_LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[([^\n]*?)\]\(([^)\n]*?)\)").expect("regex de enlaces en línea")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Segment {
    Text { text: String },
    Link { text: String, target: String },
}

impl Segment {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn link(text: impl Into<String>, target: impl Into<String>) -> Self {
        Self::Link {
            text: text.into(),
            target: target.into(),
        }
    }
}

/// Forma markdown original del segmento.
impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Text { text } => f.write_str(text),
            Segment::Link { text, target } => write!(f, "[{text}]({target})"),
        }
    }
}

/// Divide una línea en segmentos. Los tramos de texto vacíos se omiten, así
/// que una línea vacía produce cero segmentos.
pub fn render_line(line: &str) -> Vec<Segment> {
    let (mut segments, last_end) = INLINE_LINK_RE.captures_iter(line).fold(
        (Vec::new(), 0usize),
        |(mut segments, last_end), caps| {
            let whole = caps.get_match();
            if whole.start() > last_end {
                segments.push(Segment::text(&line[last_end..whole.start()]));
            }
            segments.push(Segment::link(&caps[1], &caps[2]));
            (segments, whole.end())
        },
    );

    if last_end < line.len() {
        segments.push(Segment::text(&line[last_end..]));
    }
    segments
}

/// Renderiza un mensaje completo, una entrada por cada línea (`\n`).
pub fn render_message(content: &str) -> Vec<Vec<Segment>> {
    content.split('\n').map(render_line).collect()
}
