use std::process::Command;

use tracing::{info, warn};

use crate::gesture_classifier::GestureAction;

/// Programa externo (y argumentos) que materializa una acción. `Message` no
/// necesita ninguno: se escribe en el log.
pub fn launcher_for(action: &GestureAction) -> Option<(&'static str, Vec<String>)> {
    match action {
        GestureAction::Message { .. } => None,
        GestureAction::Image { path } | GestureAction::Sound { path } => {
            Some(("xdg-open", vec![path.clone()]))
        }
        GestureAction::Url { href } => Some(("xdg-open", vec![href.clone()])),
    }
}

/// Ejecuta la acción asociada a un gesto reconocido sin bloquear al llamador.
pub fn run_action(gesture: &str, action: &GestureAction) {
    if let GestureAction::Message { text } = action {
        info!(gesture, text = %text, "mensaje de gesto");
        return;
    }

    let Some((program, args)) = launcher_for(action) else {
        return;
    };

    match Command::new(program).args(&args).spawn() {
        Ok(_) => info!(gesture, ?action, "acción lanzada"),
        Err(e) => warn!(gesture, program, error = %e, "no se pudo lanzar la acción"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launchers() {
        let msg = GestureAction::Message { text: "hola".into() };
        assert!(launcher_for(&msg).is_none());

        let url = GestureAction::Url { href: "https://example.org".into() };
        let (program, args) = launcher_for(&url).unwrap();
        assert_eq!(program, "xdg-open");
        assert_eq!(args, vec!["https://example.org".to_string()]);

        let sound = GestureAction::Sound { path: "/tmp/ding.ogg".into() };
        assert_eq!(launcher_for(&sound).unwrap().1, vec!["/tmp/ding.ogg".to_string()]);
    }
}
