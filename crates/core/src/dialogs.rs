/// Dialogs the target application is known to raise, identified by exact title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DialogKind {
    IncompleteSymbols,
    ConvertCompile,
    CommentedOutSymbols,
    Compiling,
    /// Compiling dialog of builds that report into the main window's log
    LogCompiling,
    CompileComplete,
    ProgramCompilation,
    OperationComplete,
    Confirmation,
    FileLoading,
    PostLoadWarning,
}

/// What the orchestrator does when a dialog appears.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogAction {
    /// Close it, capture its description and fail the compile
    Abort,
    /// Focus it and press Enter
    Confirm,
    /// First sighting marks compilation as started
    MarkCompiling,
    /// First sighting reads the completion statistics
    CaptureStatistics,
    /// Remember the handle for detailed message extraction
    MarkDetail,
    /// Close it and carry on
    Dismiss,
    /// Click the discard button, or close it if there is none
    AnswerNo,
    Ignore,
}

const TABLE: &[(&str, DialogKind, DialogAction)] = &[
    ("Incomplete Symbols", DialogKind::IncompleteSymbols, DialogAction::Abort),
    ("Convert/Compile", DialogKind::ConvertCompile, DialogAction::Confirm),
    ("Commented out Symbols and/or Devices", DialogKind::CommentedOutSymbols, DialogAction::Confirm),
    ("Compiling...", DialogKind::Compiling, DialogAction::MarkCompiling),
    ("VisionTools Pro-e Compiling...", DialogKind::LogCompiling, DialogAction::MarkCompiling),
    ("Compile Complete", DialogKind::CompileComplete, DialogAction::CaptureStatistics),
    ("Program Compilation", DialogKind::ProgramCompilation, DialogAction::MarkDetail),
    ("Operation Complete", DialogKind::OperationComplete, DialogAction::Dismiss),
    ("Confirmation", DialogKind::Confirmation, DialogAction::AnswerNo),
    ("VisionTools Pro-e", DialogKind::FileLoading, DialogAction::Ignore),
    ("VisionTools(R) Pro-e", DialogKind::PostLoadWarning, DialogAction::Dismiss),
];

/// Label of the button that discards changes in the close-time confirmation.
pub const DISCARD_BUTTON: &str = "&No";

impl DialogKind {
    pub fn from_title(title: &str) -> Option<Self> {
        TABLE.iter().find(|(t, _, _)| *t == title).map(|(_, k, _)| *k)
    }

    pub fn title(self) -> &'static str {
        TABLE
            .iter()
            .find(|(_, k, _)| *k == self)
            .map(|(t, _, _)| *t)
            .unwrap_or_default()
    }

    /// Action taken while waiting for the compile to finish.
    pub fn action(self) -> DialogAction {
        TABLE
            .iter()
            .find(|(_, k, _)| *k == self)
            .map(|(_, _, a)| *a)
            .unwrap_or(DialogAction::Ignore)
    }

    /// Action taken while draining leftovers before the trigger keystroke.
    pub fn preflight_action(self) -> DialogAction {
        match self {
            DialogKind::OperationComplete => DialogAction::Dismiss,
            _ => DialogAction::Ignore,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn titles_match_exactly() {
        assert_eq!(DialogKind::from_title("Compile Complete"), Some(DialogKind::CompileComplete));
        assert_eq!(DialogKind::from_title("compile complete"), None);
        assert_eq!(DialogKind::from_title("Compile Complete "), None);
        assert_eq!(DialogKind::from_title("Compiling..."), Some(DialogKind::Compiling));
        assert_eq!(
            DialogKind::from_title("VisionTools Pro-e Compiling..."),
            Some(DialogKind::LogCompiling)
        );
    }

    #[test]
    fn every_kind_round_trips_its_title() {
        for (title, kind, _) in TABLE {
            assert_eq!(kind.title(), *title);
            assert_eq!(DialogKind::from_title(title), Some(*kind));
        }
    }

    #[test]
    fn dispatch_table() {
        assert_eq!(DialogKind::IncompleteSymbols.action(), DialogAction::Abort);
        assert_eq!(DialogKind::ConvertCompile.action(), DialogAction::Confirm);
        assert_eq!(DialogKind::CommentedOutSymbols.action(), DialogAction::Confirm);
        assert_eq!(DialogKind::LogCompiling.action(), DialogAction::MarkCompiling);
        assert_eq!(DialogKind::ProgramCompilation.action(), DialogAction::MarkDetail);
        assert_eq!(DialogKind::Confirmation.action(), DialogAction::AnswerNo);
    }

    #[test]
    fn preflight_only_dismisses_operation_complete() {
        assert_eq!(DialogKind::OperationComplete.preflight_action(), DialogAction::Dismiss);
        assert_eq!(DialogKind::Confirmation.preflight_action(), DialogAction::Ignore);
        assert_eq!(DialogKind::IncompleteSymbols.preflight_action(), DialogAction::Ignore);
    }
}
