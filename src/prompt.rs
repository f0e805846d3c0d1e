//! Prompt rendering and payload sanitization.
//!
//! [`build_prompt`] turns a (breed, topic) pair into a provider-agnostic
//! natural-language instruction block; [`sanitize`] bounds the payload
//! that actually goes over the wire, whatever the topic instructions
//! grew to.

/// Character cap applied to the final prompt before any provider call.
pub const MAX_PROMPT_CHARS: usize = 1800;

/// Topic category, inferred from the topic string, selecting the
/// generation instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TopicCategory {
    Seasonal,
    Indoor,
    Children,
    Socialization,
    Outdoor,
    Visitors,
    General,
}

fn categorize(topic: &str) -> TopicCategory {
    let t = topic.to_lowercase();
    if t.contains("cuidados durante")
        || t.contains("invierno")
        || t.contains("verano")
        || t.contains("primavera")
        || t.contains("otoño")
    {
        TopicCategory::Seasonal
    } else if t.contains("interiores") {
        TopicCategory::Indoor
    } else if t.contains("niños") {
        TopicCategory::Children
    } else if t.contains("socialización") {
        TopicCategory::Socialization
    } else if t.contains("aire libre") {
        TopicCategory::Outdoor
    } else if t.contains("visitas") {
        TopicCategory::Visitors
    } else {
        TopicCategory::General
    }
}

/// Render the instruction block for a breed and topic.
///
/// The block contains a role statement, the topic, four to six
/// category-specific generation instructions, and an explicit output
/// format request (3–5 bullets under a heading, at most ~200 words,
/// Spanish). Callers still pass the result through [`sanitize`] before
/// any provider call.
pub fn build_prompt(breed: &str, topic: &str) -> String {
    let breed = breed.trim();
    let role = if breed.is_empty() || breed.eq_ignore_ascii_case("mestizo") {
        "Eres un experto veterinario especializado en perros mestizos.".to_string()
    } else {
        format!("Eres un experto veterinario especializado en la raza {breed}.")
    };

    let instructions: &[&str] = match categorize(topic) {
        TopicCategory::Seasonal => &[
            "Da consejos prácticos adaptados a la estación del año mencionada.",
            "Incluye precauciones de temperatura y clima para esta raza.",
            "Menciona ajustes de alimentación o hidratación si aplican.",
            "Señala señales de alerta que requieren visita al veterinario.",
        ],
        TopicCategory::Indoor => &[
            "Propón juegos y actividades que funcionen dentro de casa.",
            "Adapta la intensidad al espacio reducido.",
            "Incluye al menos una actividad de estimulación mental.",
            "Indica la duración recomendada de cada actividad.",
        ],
        TopicCategory::Children => &[
            "Explica cómo supervisar la interacción entre el perro y los niños.",
            "Da pautas de lenguaje corporal canino que los niños deben respetar.",
            "Propón juegos seguros para compartir.",
            "Señala situaciones que conviene evitar.",
            "Incluye una recomendación de educación para el perro.",
        ],
        TopicCategory::Socialization => &[
            "Describe cómo presentar al perro a otros perros de forma gradual.",
            "Da señales de estrés o incomodidad a vigilar.",
            "Propón entornos controlados para practicar.",
            "Menciona la importancia del refuerzo positivo.",
        ],
        TopicCategory::Outdoor => &[
            "Propón actividades al aire libre adecuadas para esta raza.",
            "Incluye precauciones de seguridad y de clima.",
            "Menciona el equipamiento recomendado (correa, arnés, agua).",
            "Indica la frecuencia e intensidad recomendadas.",
        ],
        TopicCategory::Visitors => &[
            "Explica cómo preparar al perro para recibir visitas en casa.",
            "Da pautas para gestionar la llegada y los saludos.",
            "Propón ejercicios de calma previos.",
            "Señala cuándo conviene dar al perro un espacio propio.",
        ],
        TopicCategory::General => &[
            "Da consejos prácticos y accionables sobre el tema.",
            "Adapta las recomendaciones a las necesidades de la raza.",
            "Incluye frecuencias o cantidades concretas cuando aplique.",
            "Señala señales de alerta que requieren atención veterinaria.",
        ],
    };

    let mut prompt = String::with_capacity(512);
    prompt.push_str(&role);
    prompt.push('\n');
    prompt.push_str(&format!("Tema: {topic}.\n"));
    for line in instructions {
        prompt.push_str("- ");
        prompt.push_str(line);
        prompt.push('\n');
    }
    prompt.push_str(
        "Presenta la respuesta como una lista de 3 a 5 viñetas bajo un encabezado breve, \
         con un máximo de 200 palabras, en español.",
    );
    prompt
}

/// Bound a prompt payload: strip emoji and non-BMP characters, collapse
/// whitespace runs, and truncate to `max_chars`, appending a concision
/// request when truncation happened.
pub fn sanitize(text: &str, max_chars: usize) -> String {
    let mut out = String::with_capacity(text.len().min(max_chars + 32));
    let mut pending_space = false;

    for c in text.chars() {
        if is_stripped(c) {
            continue;
        }
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.push(c);
    }

    if out.chars().count() > max_chars {
        out = out.chars().take(max_chars).collect();
        out.push_str(" Responde de forma concisa.");
    }
    out
}

/// Characters removed outright: anything outside the BMP (emoji,
/// surrogate-pair symbols) plus the BMP symbol blocks and variation
/// selectors commonly used for emoji.
fn is_stripped(c: char) -> bool {
    let cp = c as u32;
    cp > 0xFFFF || (0x2600..=0x27BF).contains(&cp) || (0xFE00..=0xFE0F).contains(&cp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_contains_role_topic_and_format() {
        let p = build_prompt("Labrador", "control de peso y apetito");
        assert!(p.contains("especializado en la raza Labrador"));
        assert!(p.contains("Tema: control de peso y apetito."));
        assert!(p.contains("3 a 5 viñetas"));
        assert!(p.contains("200 palabras"));
        assert!(p.contains("español"));
    }

    #[test]
    fn mixed_breed_role_statement() {
        let p = build_prompt("", "salud dental");
        assert!(p.contains("perros mestizos"));
        let p = build_prompt("mestizo", "salud dental");
        assert!(p.contains("perros mestizos"));
    }

    #[test]
    fn seasonal_topic_selects_seasonal_instructions() {
        let p = build_prompt("Beagle", "cuidados durante el invierno");
        assert!(p.contains("estación del año"));
    }

    #[test]
    fn children_topic_has_five_instructions() {
        let p = build_prompt("Golden", "interacción con niños");
        assert_eq!(p.matches("\n- ").count(), 5);
    }

    #[test]
    fn sanitize_strips_emoji_and_collapses_whitespace() {
        let s = sanitize("hola 🐶  mundo\n\n\tfin", 1800);
        assert_eq!(s, "hola mundo fin");
    }

    #[test]
    fn sanitize_truncates_with_suffix() {
        let long = "palabra ".repeat(400);
        let s = sanitize(&long, 100);
        assert!(s.ends_with("Responde de forma concisa."));
        assert!(s.chars().count() <= 100 + " Responde de forma concisa.".chars().count());
    }

    #[test]
    fn sanitize_short_text_untouched_by_cap() {
        let s = sanitize("texto corto", 1800);
        assert_eq!(s, "texto corto");
    }
}
