//! Prompt text sent to the interviewer model.

use crate::signals::{NEXT_MARKER, ROAST_MARKER};

pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are a senior software engineer running a realistic technical interview. Be direct and concise, push back on vague answers, and never answer your own questions.";

/// Sent in place of the candidate's answer when they give up on a question.
pub const SURRENDER_PROMPT: &str =
    "User surrenders. Give a snappy 1-2 sentence correction and move on.";

/// Sent right after surrender feedback to get the next question.
pub const CONTINUE_PROMPT: &str = "Continue with the next question.";

pub const VARIETY_SUFFIX: &str = "\n\n[Based on the conversation so far, ask a different type of question. Avoid repetition. Reference what has been discussed to ensure variety.]";

/// Opening prompt, with or without resume text.
///
/// Topic instructions, when present, come first and are separated by a blank line.
pub fn initial_prompt(resume: &str, topic_instructions: &str) -> String {
    let resume = resume.trim();
    let body = if resume.is_empty() {
        format!(
            "Conduct a technical interview following these guidelines:\n\
             - Ask questions that a real interviewer would ask for this role/experience level\n\
             - Vary question types (conceptual, practical, problem-solving)\n\
             - Avoid repeating similar questions. Reference conversation history to ensure variety\n\
             - Ask follow-up questions based on the candidate's answers, not generic questions\n\
             - Ask one question at a time\n\
             - When you want to move to the next question, include the signal {NEXT_MARKER} at the end of your response\n\
             - When you've finished all questions, include the signal {ROAST_MARKER} at the end of your final response."
        )
    } else {
        format!(
            "Here is the user's resume:\n\n{resume}\n\n\
             Conduct a technical interview. Ask one question at a time. \
             When you want to move to the next question, include the signal {NEXT_MARKER} at the end of your response. \
             When you've finished all questions, include the signal {ROAST_MARKER} at the end of your final response."
        )
    };

    let topic_instructions = topic_instructions.trim();
    if topic_instructions.is_empty() {
        body
    } else {
        format!("{topic_instructions}\n\n{body}")
    }
}

/// Candidate answer followed by the variety nudge.
pub fn answer_prompt(answer: &str) -> String {
    format!("{}{VARIETY_SUFFIX}", answer.trim())
}
