//! Prompt builders for the evaluator, optimizer, analyst and question
//! generator.

use std::fmt::Write;

use crate::model::{Level, Question};

/// System prompt shared by every agent call.
pub const SYSTEM_PROMPT: &str = "You are an expert Operating Systems instructor and curriculum designer. Follow the requested output format exactly.";

/// Ask for a CIDDP evaluation as a JSON object with a `scores` map.
pub fn evaluator_prompt(plan: &str, skill_summary: &str, sample_questions: &[Question]) -> String {
    let mut prompt = format!(
        "Evaluate the following lesson plan using the CIDDP criteria \
         (Clarity, Integrity, Depth, Practicality, Pertinence).\n\n\
         Student Skill Profile: {skill_summary}\n\n\
         Lesson Plan:\n{plan}\n\n"
    );

    if !sample_questions.is_empty() {
        prompt.push_str("Sample Questions for Evaluation:\n");
        for q in sample_questions {
            let _ = write!(
                prompt,
                "Q: {}\nOptions: {}\nCorrect: {}\n\n",
                q.question.as_deref().unwrap_or_default(),
                q.options.join(", "),
                q.answer.as_deref().unwrap_or_default(),
            );
        }
    }

    prompt.push_str(
        "Return a single JSON object (no extra text) with this schema:\n\
         {\"scores\": {\"Clarity\": 1-5, \"Integrity\": 1-5, \"Depth\": 1-5, \"Practicality\": 1-5, \"Pertinence\": 1-5},\n \
         \"comments\": {\"Clarity\": \"...\", ...}, \"summary\": \"short summary\"}\n\
         If JSON is impossible, answer with exactly five lines:\n\
         [C]:<score>; comment\n[I]:<score>; comment\n[D]:<score>; comment\n\
         [P]:<score>; comment (Practicality)\n[P]:<score>; comment (Pertinence)",
    );
    prompt
}

/// Ask for a revised plan plus improvements, next focus areas and an exercise.
pub fn optimizer_prompt(plan: &str, skill_summary: &str, feedback: &str) -> String {
    let mut prompt = format!(
        "Update the lesson plan for this student, addressing the feedback with \
         minimal but substantive changes.\n\n\
         Student Profile: {skill_summary}\n\n"
    );
    if !feedback.trim().is_empty() {
        let _ = write!(prompt, "Recent Feedback:\n{feedback}\n\n");
    }
    let _ = write!(
        prompt,
        "Current Plan:\n{plan}\n\n\
         Return ONLY a JSON object with this schema:\n\
         {{\"plan\": \"updated lesson plan text\",\n \
         \"improvements\": [{{\"text\": \"what changed\", \"area\": \"topic area\", \"priority\": 1-5}}],\n \
         \"focus_next\": [\"topic\"],\n \
         \"exercise\": {{\"title\": \"...\", \"steps\": [\"...\"]}}}}"
    );
    prompt
}

/// Ask for at most `max_items` likely misconceptions as `{"misconceptions": [...]}`.
pub fn analyst_prompt(
    excerpt: &str,
    skill_summary: &str,
    focus_areas: &[String],
    max_items: usize,
) -> String {
    let mut prompt = format!(
        "Identify the top likely misconceptions students may have about the \
         context below. Return at most {max_items} concise items.\n\n\
         Student Skill Profile: {skill_summary}\n\n"
    );
    if !focus_areas.is_empty() {
        let _ = write!(
            prompt,
            "Focus areas (prioritize these):\n- {}\n\n",
            focus_areas.join("\n- ")
        );
    }
    let _ = write!(
        prompt,
        "Context:\n{excerpt}\n\n\
         Return a JSON object exactly in this form (no extra text): \
         {{\"misconceptions\": [\"...\"]}}"
    );
    prompt
}

/// Ask for `count` multiple-choice questions as a bare JSON array.
pub fn question_generation_prompt(plan: &str, level: Level, count: usize) -> String {
    format!(
        "Generate {count} multiple-choice questions for the lesson plan below.\n\n\
         Lesson Plan:\n{plan}\n\n\
         Target Level: {level}\n\n\
         Return ONLY a JSON array. Each item must have exactly these fields: \
         id, topic, level, question, options (3 to 5 distinct strings), \
         answer (exactly one of the options), explanation.\n\
         Example item: {{\"id\": \"q1\", \"topic\": \"Processes\", \"level\": \"{level}\", \
         \"question\": \"What is a process?\", \"options\": [\"A program in execution\", \
         \"An instruction\", \"A file\"], \"answer\": \"A program in execution\", \
         \"explanation\": \"A process is an instance of a program in execution.\"}}"
    )
}
