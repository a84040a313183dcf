use crate::game::ReplicaPlayer;
use macroquad::prelude::*;
use shared::{Vec2 as WorldVec, DEFAULT_ARENA_RADIUS};

/// Everything the HUD shows besides the balls
#[derive(Debug, Clone)]
pub struct HudInfo {
    pub player_id: Option<u32>,
    pub connected: bool,
    pub rtt_ms: i64,
    pub autopilot: bool,
}

/// Maps world coordinates onto the window so the initial arena always fits.
pub struct Renderer {
    arena_center: WorldVec,
    player_radius: f32,
}

impl Renderer {
    pub fn new(arena_center: WorldVec, player_radius: f32) -> Self {
        Self {
            arena_center,
            player_radius,
        }
    }

    fn scale(&self) -> f32 {
        screen_width().min(screen_height()) / (DEFAULT_ARENA_RADIUS * 2.1)
    }

    fn to_screen(&self, p: WorldVec) -> (f32, f32) {
        let scale = self.scale();
        (
            screen_width() / 2.0 + (p.x - self.arena_center.x) * scale,
            screen_height() / 2.0 + (p.y - self.arena_center.y) * scale,
        )
    }

    /// Draws one frame.
    pub fn render(&self, players: &[ReplicaPlayer], arena_radius: Option<f32>, hud: &HudInfo) {
        clear_background(Color::from_rgba(26, 26, 26, 255));

        if let Some(radius) = arena_radius {
            self.draw_arena(radius);
        }

        for player in players {
            let is_local_player = Some(player.id) == hud.player_id;
            self.draw_player(player, is_local_player);
        }

        self.draw_hud(hud, players.len());
    }

    fn draw_arena(&self, radius: f32) {
        let (cx, cy) = self.to_screen(self.arena_center);
        let r = radius * self.scale();
        draw_circle(cx, cy, r, Color::from_rgba(48, 52, 64, 255));
        draw_circle_lines(cx, cy, r, 3.0, Color::from_rgba(255, 96, 64, 255));
    }

    fn draw_player(&self, player: &ReplicaPlayer, is_local_player: bool) {
        let (x, y) = self.to_screen(player.position);
        let r = self.player_radius * self.scale();

        let color = match (player.alive, is_local_player) {
            (false, _) => Color::from_rgba(90, 90, 90, 160),
            (true, true) => GREEN,
            (true, false) => Color::from_rgba(255, 68, 68, 255),
        };
        draw_circle(x, y, r, color);
        draw_circle_lines(x, y, r, 2.0, WHITE);

        if is_local_player && player.alive && player.velocity.length() > 10.0 {
            let end = player.position + player.velocity * 0.15;
            let (ex, ey) = self.to_screen(end);
            draw_line(x, y, ex, ey, 2.0, YELLOW);
        }

        let label = player.id.to_string();
        draw_text(&label, x - 4.0, y + 4.0, 16.0, WHITE);
    }

    fn draw_hud(&self, hud: &HudInfo, player_count: usize) {
        let connection_color = if hud.player_id.is_some() {
            GREEN
        } else if hud.connected {
            YELLOW
        } else {
            RED
        };
        draw_rectangle(10.0, 10.0, 8.0, 8.0, connection_color);
        draw_text("CON", 22.0, 18.0, 14.0, WHITE);

        draw_text(&rtt_label(hud.rtt_ms), 10.0, 36.0, 16.0, WHITE);
        draw_text(
            &format!("players: {}", player_count),
            10.0,
            54.0,
            16.0,
            WHITE,
        );
        if hud.autopilot {
            draw_text("AUTOPILOT", 10.0, 72.0, 16.0, YELLOW);
        }
    }
}

/// `-1` means no round trip has completed yet.
pub fn rtt_label(rtt_ms: i64) -> String {
    if rtt_ms < 0 {
        "RTT: --".to_string()
    } else {
        format!("RTT: {}ms", rtt_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rtt_label() {
        assert_eq!(rtt_label(-1), "RTT: --");
        assert_eq!(rtt_label(42), "RTT: 42ms");
    }
}
