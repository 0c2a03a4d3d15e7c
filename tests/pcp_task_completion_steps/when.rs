//! When steps for PCP completion BDD scenarios.

use super::world::{PcpCompletionWorld, run_async};
use companion_tasks::task::domain::TaskEvent;
use rstest_bdd_macros::when;

#[when(r#"the patient selects clinical provider "{provider_id}""#)]
fn select_provider(world: &mut PcpCompletionWorld, provider_id: String) {
    let result = run_async(world.service.apply_event(
        world.link_id,
        TaskEvent::PcpSelected {
            clinical_provider_id: provider_id,
        },
    ));
    world.last_result = Some(result);
}

#[when(r#"the patient answers "{question_tag}" with "{answer}""#)]
fn answer_question(
    world: &mut PcpCompletionWorld,
    question_tag: String,
    answer: String,
) -> Result<(), eyre::Report> {
    let event = TaskEvent::from_social_history_answer(&question_tag, &answer)
        .ok_or_else(|| eyre::eyre!("{question_tag} does not affect the PCP task"))?;
    let result = run_async(world.service.apply_event(world.link_id, event));
    world.last_result = Some(result);
    Ok(())
}
