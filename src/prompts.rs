//! Prompt builders for the generation and evaluation calls.
//!
//! Every prompt instructs the model to respond in JSON and states the
//! exact output shape; the JSON-mode client plus [`crate::llm::generate_json`]
//! handle the rest. Builders take plain slices so callers do not need
//! provider-specific types.

use std::fmt::Write;

/// A question handed to the answer and evaluation prompts.
pub struct PromptQuestion<'a> {
    pub question: &'a str,
    pub keywords: &'a str,
    pub difficulty: &'a str,
}

/// One answered question with its score, for the session-level feedback prompt.
pub struct PromptQaPair<'a> {
    pub question: &'a str,
    pub answer: &'a str,
    pub score: f64,
    pub feedback: &'a str,
}

fn numbered_chunks(chunks: &[&str]) -> String {
    let mut out = String::new();
    for (i, text) in chunks.iter().enumerate() {
        if i > 0 {
            out.push_str("\n\n");
        }
        let _ = write!(out, "[Chunk {}]: {}", i + 1, text);
    }
    out
}

/// Batch question generation over retrieved context.
///
/// `included_levels` are the Bloom levels the batch may draw on, from
/// the lowest up to the targeted one.
pub fn batch_questions(
    context_chunks: &[&str],
    difficulty: &str,
    included_levels: &[&str],
    course_name: Option<&str>,
    num_questions: usize,
) -> String {
    let chunks_text = numbered_chunks(context_chunks);
    let course_info = course_name
        .map(|c| format!("\nCourse: {c}"))
        .unwrap_or_default();
    let levels_info = if included_levels.is_empty() {
        String::new()
    } else {
        format!("\nCovered Bloom Levels: {}", included_levels.join(", "))
    };

    format!(
        r#"You are an expert educator creating interview questions. Generate {num_questions} high-quality questions based on the provided context.

Context Chunks:
{chunks_text}
{course_info}

Difficulty Level: {difficulty} (Bloom Taxonomy){levels_info}
Question Type: Short answer / Essay (Q&A only, NO multiple choice)

Requirements:
1. Generate exactly {num_questions} questions
2. Questions must be based ONLY on the provided context chunks
3. Questions should test understanding at the {difficulty} level according to Bloom's Taxonomy
4. Each question should be unique and cover different aspects
5. Do NOT include reference answers (they will be generated separately)
6. Do NOT include multiple choice options
7. Questions should be clear, specific, and answerable from the context
8. Avoid questions that simply ask "what does the text say" - focus on understanding and application

Output format (JSON):
{{
  "questions": [
    {{
      "question": "Question text here",
      "keywords": "keyword1, keyword2, keyword3",
      "difficulty": "EASY|MEDIUM|HARD"
    }}
  ]
}}

Generate the questions now:"#
    )
}

/// Reference answers for an approved batch, matched back by index.
pub fn reference_answers(
    questions: &[PromptQuestion<'_>],
    context_chunks: &[&str],
    course_name: Option<&str>,
) -> String {
    let mut questions_text = String::new();
    for (i, q) in questions.iter().enumerate() {
        if i > 0 {
            questions_text.push_str("\n\n");
        }
        let _ = write!(
            questions_text,
            "Q{}: {}\nKeywords: {}\nDifficulty: {}",
            i + 1,
            q.question,
            q.keywords,
            q.difficulty
        );
    }
    let chunks_text = numbered_chunks(context_chunks);
    let course_info = course_name
        .map(|c| format!("\nCourse: {c}"))
        .unwrap_or_default();

    format!(
        r#"You are an expert educator creating reference answers for interview questions. Generate comprehensive reference answers based on the provided questions and context.

Questions:
{questions_text}

Context Chunks:
{chunks_text}
{course_info}

Requirements:
1. Generate reference answers for ALL questions
2. Answers must be based on the provided context chunks
3. Answers should be comprehensive and detailed
4. Answers should demonstrate deep understanding of the topic
5. Answers should align with the difficulty level of each question
6. Answers should use the keywords provided for each question

Output format (JSON):
{{
  "answers": [
    {{
      "question_index": 0,
      "reference_answer": "Comprehensive reference answer here..."
    }}
  ]
}}

Generate the reference answers now:"#
    )
}

/// Opening and closing scripts from session metadata.
pub fn session_script(
    session_name: &str,
    course_name: Option<&str>,
    difficulty_level: Option<&str>,
    session_type: &str,
) -> String {
    let course_info = course_name
        .map(|c| format!("\nCourse: {c}"))
        .unwrap_or_default();
    let difficulty_info = difficulty_level
        .map(|d| format!("\nDifficulty Level: {d}"))
        .unwrap_or_default();

    format!(
        r#"You are creating a script for an {session_type} session. Generate professional opening and closing scripts.

Session Name: {session_name}
{course_info}
{difficulty_info}

Requirements:
1. Opening script should:
   - Welcome students/participants warmly
   - Explain the session purpose and format
   - Provide clear instructions
   - Set expectations
   - Be professional and encouraging

2. Closing script should:
   - Thank participants for their participation
   - Provide next steps or information
   - Be encouraging and supportive
   - Be professional and warm

3. Scripts should be in Vietnamese (unless specified otherwise)
4. Scripts should be appropriate for the session type: {session_type}

Output format (JSON):
{{
  "opening_script": "Opening script text here...",
  "closing_script": "Closing script text here..."
}}

Generate the scripts now:"#
    )
}

/// Six-criterion evaluation of one submitted answer.
pub fn evaluate_answer(
    question: &str,
    student_answer: &str,
    reference_answer: &str,
    difficulty: &str,
) -> String {
    format!(
        r#"You are an expert evaluator assessing a student's answer. Evaluate the answer based on multiple criteria.

Question: {question}

Student Answer: {student_answer}

Reference Answer: {reference_answer}

Difficulty Level: {difficulty}

Evaluation Criteria:
1. Correctness (0-10): How accurate is the answer?
2. Coverage (0-10): How well does it cover the topic?
3. Reasoning (0-10): How logical and well-reasoned is the answer?
4. Creativity (0-10): How creative and original is the approach?
5. Communication (0-10): How clear and well-communicated is the answer?
6. Attitude (0-10): How professional and positive is the tone?

Requirements:
1. Provide scores for each criterion (0-10 scale)
2. Provide detailed feedback for the student
3. Highlight strengths and weaknesses
4. Be constructive and encouraging
5. Consider the difficulty level when scoring

Output format (JSON):
{{
  "scores": {{
    "correctness": 8.0,
    "coverage": 7.5,
    "reasoning": 7.5,
    "creativity": 7.0,
    "communication": 8.5,
    "attitude": 8.0
  }},
  "overall_score": 7.8,
  "feedback": "Detailed feedback here...",
  "strengths": ["strength 1", "strength 2"],
  "weaknesses": ["weakness 1", "weakness 2"]
}}

Evaluate the answer now:"#
    )
}

/// Session-level feedback across all answered questions.
pub fn overall_feedback(qa_pairs: &[PromptQaPair<'_>], mean_score: f64) -> String {
    let mut qa_text = String::new();
    for (i, pair) in qa_pairs.iter().enumerate() {
        if i > 0 {
            qa_text.push_str("\n\n");
        }
        let _ = write!(
            qa_text,
            "Q{}: {}\nAnswer: {}\nScore: {}/10\nFeedback: {}",
            i + 1,
            pair.question,
            pair.answer,
            pair.score,
            pair.feedback
        );
    }

    format!(
        r#"You are providing overall feedback for a complete interview session. Generate comprehensive overall feedback.

Question-Answer Pairs:
{qa_text}

Overall Scores Summary:
mean: {mean_score}/10

Requirements:
1. Provide overall assessment of performance
2. Highlight main strengths across all answers
3. Identify main weaknesses and areas for improvement
4. Provide specific recommendations for improvement
5. Be constructive and encouraging
6. Consider the overall performance, not just individual answers

Output format (JSON):
{{
  "overall_feedback": "Comprehensive overall feedback here...",
  "strengths": ["strength 1", "strength 2"],
  "weaknesses": ["weakness 1", "weakness 2"],
  "recommendations": ["recommendation 1", "recommendation 2"]
}}

Generate the overall feedback now:"#
    )
}
