//! Plain-text rendering of a world snapshot from one player's point of view

use crate::session::Identity;
use ctf_shared::{Team, WorldSnapshot, WALL};

const RECENT_MESSAGES: usize = 5;

/// Renders the status block appended to every tool reply
pub fn render(snapshot: &WorldSnapshot, me: Option<&Identity>) -> String {
    let mut lines = Vec::new();

    lines.push(format!(
        "SCORE: Red {} - Blue {}",
        snapshot.red_score, snapshot.blue_score
    ));
    if snapshot.game_ended {
        let winner = if snapshot.winner.is_empty() {
            "none"
        } else {
            snapshot.winner.as_str()
        };
        lines.push(format!("GAME OVER: winner {}", winner));
    }

    lines.push(match me {
        None => "ME: Not connected".to_string(),
        Some(me) => match snapshot.player(&me.player_id) {
            None => "ME: Not found in game".to_string(),
            Some(player) => {
                let flag = if player.has_flag { " (carrying flag)" } else { "" };
                let life = if player.is_alive { "" } else { " (dead)" };
                format!(
                    "ME: {} team at ({:.0},{:.0}){}{}",
                    me.team.as_str().to_uppercase(),
                    player.x,
                    player.y,
                    flag,
                    life
                )
            }
        },
    });

    for team in [Team::Red, Team::Blue] {
        lines.push(flag_line(snapshot, team, me));
    }

    let mut teammates = Vec::new();
    let mut enemies = Vec::new();
    let my_id = me.map(|m| m.player_id.as_str());
    let mut others: Vec<_> = snapshot
        .players
        .iter()
        .filter(|(id, player)| player.is_alive && Some(id.as_str()) != my_id)
        .collect();
    others.sort_by(|a, b| a.0.cmp(b.0));

    for (_, player) in others {
        let flag = if player.has_flag { " (carrying flag)" } else { "" };
        let entry = format!("{} at ({:.0},{:.0}){}", player.name, player.x, player.y, flag);
        match me {
            Some(me) if player.team == me.team => teammates.push(entry),
            _ => enemies.push(entry),
        }
    }

    if !teammates.is_empty() {
        lines.push(format!("TEAMMATES: {}", teammates.join(", ")));
    }
    if enemies.is_empty() {
        lines.push("ENEMIES: None visible".to_string());
    } else {
        lines.push(format!("ENEMIES: {}", enemies.join(", ")));
    }

    if let Some(me) = me {
        let messages = snapshot.team_messages(me.team);
        if messages.is_empty() {
            lines.push("TEAM CHAT: No recent messages".to_string());
        } else {
            lines.push("TEAM CHAT:".to_string());
            let skip = messages.len().saturating_sub(RECENT_MESSAGES);
            for msg in &messages[skip..] {
                let seconds_ago = (snapshot.game_time - msg.timestamp).max(0) / 1000;
                let age = if seconds_ago > 0 {
                    format!("{}s ago", seconds_ago)
                } else {
                    "now".to_string()
                };
                lines.push(format!("  {}: \"{}\" ({})", msg.sender, msg.message, age));
            }
        }
    }

    lines.push(format!(
        "FIELD: Red base (50,300), Blue base (750,300), Wall ({:.0}-{:.0},{:.0}-{:.0})",
        WALL.left, WALL.right, WALL.top, WALL.bottom
    ));

    lines.join("\n")
}

fn flag_line(snapshot: &WorldSnapshot, team: Team, me: Option<&Identity>) -> String {
    let label = team.as_str().to_uppercase();
    let flag = snapshot.flag(team);

    match flag.carrier() {
        Some(carrier) => {
            let holder = if me.is_some_and(|m| m.player_id == carrier) {
                "ME".to_string()
            } else {
                match snapshot.player(carrier) {
                    Some(player) if me.is_some_and(|m| m.team == player.team) => {
                        format!("teammate {}", player.name)
                    }
                    Some(player) => format!("enemy {}", player.name),
                    None => "unknown player".to_string(),
                }
            };
            format!("{} FLAG: carried by {}", label, holder)
        }
        None => {
            let place = if flag.is_at_base { "at base" } else { "dropped" };
            format!("{} FLAG: at ({:.0},{:.0}) ({})", label, flag.x, flag.y, place)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctf_shared::{FlagRecord, PlayerRecord, Point, TeamMessage};

    fn me() -> Identity {
        Identity {
            player_id: "player_me".to_string(),
            name: "Scout".to_string(),
            team: Team::Red,
        }
    }

    fn world() -> WorldSnapshot {
        let mut world = WorldSnapshot {
            red_score: 1,
            blue_score: 2,
            red_flag: FlagRecord::at_base(Team::Red),
            blue_flag: FlagRecord::at_base(Team::Blue),
            game_time: 20_000,
            ..WorldSnapshot::default()
        };
        let mut mine = PlayerRecord::new("player_me", "Scout", Team::Red, Point::new(120.0, 310.0));
        mine.has_flag = true;
        world.players.insert(mine.id.clone(), mine);
        world.players.insert(
            "player_ally".to_string(),
            PlayerRecord::new("player_ally", "Guard", Team::Red, Point::new(60.0, 300.0)),
        );
        world.players.insert(
            "player_foe".to_string(),
            PlayerRecord::new("player_foe", "Raider", Team::Blue, Point::new(500.0, 200.0)),
        );
        world
    }

    #[test]
    fn test_render_basic_lines() {
        let text = render(&world(), Some(&me()));
        assert!(text.starts_with("SCORE: Red 1 - Blue 2"));
        assert!(text.contains("ME: RED team at (120,310) (carrying flag)"));
        assert!(text.contains("RED FLAG: at (100,300) (at base)"));
        assert!(text.contains("TEAMMATES: Guard at (60,300)"));
        assert!(text.contains("ENEMIES: Raider at (500,200)"));
        assert!(text.contains("TEAM CHAT: No recent messages"));
        assert!(text.ends_with("Wall (350-450,250-350)"));
    }

    #[test]
    fn test_render_flag_carriers() {
        let mut snapshot = world();
        snapshot.blue_flag.carrier = "player_me".to_string();
        snapshot.red_flag.carrier = "player_foe".to_string();

        let text = render(&snapshot, Some(&me()));
        assert!(text.contains("BLUE FLAG: carried by ME"));
        assert!(text.contains("RED FLAG: carried by enemy Raider"));

        snapshot.blue_flag.carrier = "player_ally".to_string();
        let text = render(&snapshot, Some(&me()));
        assert!(text.contains("BLUE FLAG: carried by teammate Guard"));
    }

    #[test]
    fn test_render_dropped_flag_and_dead_players() {
        let mut snapshot = world();
        snapshot.blue_flag.is_at_base = false;
        snapshot.blue_flag.x = 420.0;
        snapshot.players.get_mut("player_foe").unwrap().is_alive = false;
        snapshot.players.get_mut("player_me").unwrap().is_alive = false;

        let text = render(&snapshot, Some(&me()));
        assert!(text.contains("BLUE FLAG: at (420,300) (dropped)"));
        assert!(text.contains("ENEMIES: None visible"));
        assert!(text.contains("(dead)"));
    }

    #[test]
    fn test_render_keeps_last_five_own_team_messages() {
        let mut snapshot = world();
        for i in 0..7 {
            snapshot.red_team_messages.push(TeamMessage {
                sender: "Guard".to_string(),
                message: format!("msg {}", i),
                timestamp: 20_000 - (7 - i) * 1000,
                team: "red".to_string(),
            });
        }
        snapshot.blue_team_messages.push(TeamMessage {
            sender: "Raider".to_string(),
            message: "secret".to_string(),
            timestamp: 20_000,
            team: "blue".to_string(),
        });

        let text = render(&snapshot, Some(&me()));
        assert!(!text.contains("msg 1\""));
        assert!(text.contains("Guard: \"msg 2\" (5s ago)"));
        assert!(text.contains("Guard: \"msg 6\" (1s ago)"));
        assert!(!text.contains("secret"));
    }

    #[test]
    fn test_render_without_identity() {
        let text = render(&world(), None);
        assert!(text.contains("ME: Not connected"));
        assert!(!text.contains("TEAM CHAT"));
        assert!(text.contains("ENEMIES: "));
    }

    #[test]
    fn test_render_missing_self() {
        let mut snapshot = world();
        snapshot.players.remove("player_me");
        let text = render(&snapshot, Some(&me()));
        assert!(text.contains("ME: Not found in game"));
    }
}
