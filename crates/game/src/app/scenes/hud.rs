use engine::app::{text_width, DrawContext, Rgba, GLYPH_ADVANCE, LINE_ADVANCE};
use engine::dialogue::DialogueSession;
use engine::npc::{InteractionPrompt, PromptKind};

pub(crate) const BACKGROUND: Rgba = [28, 52, 44, 255];
pub(crate) const TEXT: Rgba = [250, 250, 240, 255];
pub(crate) const MUTED: Rgba = [160, 176, 196, 255];
pub(crate) const ACCENT: Rgba = [250, 206, 92, 255];
pub(crate) const GOOD: Rgba = [120, 220, 120, 255];
pub(crate) const BAD: Rgba = [236, 104, 96, 255];
const PANEL: Rgba = [18, 22, 38, 230];
const BORDER: Rgba = [236, 220, 164, 255];

const MARGIN: i32 = 4;
const STATUS_BAR_HEIGHT: u32 = 9;
const DIALOGUE_BOX_HEIGHT: u32 = 46;

/// Splits `text` on whitespace into lines no wider than `max_width` pixels.
/// Words longer than a line are kept whole on their own line.
pub(crate) fn wrap_text(text: &str, max_width: u32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    for word in text.split_whitespace() {
        if line.is_empty() {
            line.push_str(word);
            continue;
        }
        let candidate_width = text_width(&line) + GLYPH_ADVANCE as u32 + text_width(word);
        if candidate_width > max_width {
            lines.push(std::mem::take(&mut line));
            line.push_str(word);
        } else {
            line.push(' ');
            line.push_str(word);
        }
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

pub(crate) fn draw_centered(ctx: &mut dyn DrawContext, text: &str, y: i32, color: Rgba) {
    let (width, _) = ctx.size();
    let x = (width as i32 - text_width(text) as i32) / 2;
    ctx.draw_text(text, x.max(0), y, color);
}

fn draw_panel(ctx: &mut dyn DrawContext, x: i32, y: i32, width: u32, height: u32) {
    ctx.fill_rect(x, y, width, height, BORDER);
    ctx.fill_rect(x + 1, y + 1, width.saturating_sub(2), height.saturating_sub(2), PANEL);
}

/// Level, xp and the most recent word along the top edge.
pub(crate) fn draw_status(
    ctx: &mut dyn DrawContext,
    level: &str,
    xp: u32,
    last_word: Option<&str>,
) {
    let (width, _) = ctx.size();
    ctx.fill_rect(0, 0, width, STATUS_BAR_HEIGHT, PANEL);
    ctx.draw_text(&format!("{level}  XP {xp}"), 2, 2, TEXT);
    if let Some(word) = last_word {
        let x = width as i32 - text_width(word) as i32 - 2;
        ctx.draw_text(word, x, 2, ACCENT);
    }
}

pub(crate) fn prompt_label(prompt: &InteractionPrompt) -> String {
    let verb = match prompt.kind {
        PromptKind::Talk => "TALK TO",
        PromptKind::Lesson => "LEARN WITH",
        PromptKind::Quiz => "QUIZ WITH",
    };
    format!("A: {verb} {}", prompt.npc_name)
}

pub(crate) fn draw_prompt(ctx: &mut dyn DrawContext, prompt: &InteractionPrompt) {
    let (width, height) = ctx.size();
    let label = prompt_label(prompt);
    let box_width = (text_width(&label) + 6).min(width);
    let x = (width as i32 - box_width as i32) / 2;
    let y = height as i32 - 14;
    draw_panel(ctx, x, y, box_width, 11);
    ctx.draw_text(&label, x + 3, y + 3, TEXT);
}

/// The open dialogue page with its revealed translation underneath.
pub(crate) fn draw_dialogue(ctx: &mut dyn DrawContext, session: &DialogueSession) {
    let (width, height) = ctx.size();
    let box_width = width.saturating_sub(MARGIN as u32 * 2);
    let top = height as i32 - DIALOGUE_BOX_HEIGHT as i32 - MARGIN;
    draw_panel(ctx, MARGIN, top, box_width, DIALOGUE_BOX_HEIGHT);

    let text_left = MARGIN + 4;
    let text_width_px = box_width.saturating_sub(8);
    let mut y = top + 4;
    for line in wrap_text(session.visible_text(), text_width_px).iter().take(3) {
        ctx.draw_text(line, text_left, y, TEXT);
        y += LINE_ADVANCE;
    }
    y += 2;
    for line in wrap_text(session.visible_translation(), text_width_px).iter().take(2) {
        ctx.draw_text(line, text_left, y, MUTED);
        y += LINE_ADVANCE;
    }

    let pager = format!("{}/{}", session.page() + 1, session.page_count());
    let pager_x = MARGIN + box_width as i32 - text_width(&pager) as i32 - 4;
    let pager_y = top + DIALOGUE_BOX_HEIGHT as i32 - 8;
    ctx.draw_text(&pager, pager_x, pager_y, MUTED);
    if session.is_page_revealed() {
        ctx.draw_text(">", pager_x - 2 * GLYPH_ADVANCE, pager_y, ACCENT);
    }
}

pub(crate) fn draw_banner(ctx: &mut dyn DrawContext, text: &str) {
    let (width, _) = ctx.size();
    let box_width = (text_width(text) + 10).min(width);
    let x = (width as i32 - box_width as i32) / 2;
    draw_panel(ctx, x, 14, box_width, 13);
    draw_centered(ctx, text, 18, ACCENT);
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::GridPos;

    #[test]
    fn wrap_breaks_on_word_boundaries() {
        let lines = wrap_text("kaixo zer moduz zaude gaur", 40);
        assert_eq!(lines, vec!["kaixo zer", "moduz", "zaude gaur"]);
    }

    #[test]
    fn wrap_keeps_long_words_whole() {
        let lines = wrap_text("a eskerrikasko b", 20);
        assert_eq!(lines, vec!["a", "eskerrikasko", "b"]);
    }

    #[test]
    fn wrap_of_blank_text_is_empty() {
        assert!(wrap_text("   ", 100).is_empty());
    }

    #[test]
    fn prompt_names_the_npc() {
        let prompt = InteractionPrompt {
            npc_id: "miren".to_string(),
            npc_name: "Miren".to_string(),
            cell: GridPos::new(2, 1),
            kind: PromptKind::Lesson,
        };
        assert_eq!(prompt_label(&prompt), "A: LEARN WITH Miren");
    }
}
