use crate::engine::{CompletionRate, RegenerationStatus, RegenerationSummary};
use crate::models::{Habit, Project, ProjectStep, Recurrence, RecurrenceRule, TaskInstance};

fn short(id: &str) -> &str {
    &id[..std::cmp::min(8, id.len())]
}

/// One-line description of a rule, e.g. `every 2 weeks on Mon, Thu`.
pub fn describe_rule(rule: &RecurrenceRule) -> String {
    let n = rule.recurrence.interval();
    let mut text = match &rule.recurrence {
        Recurrence::Daily { .. } if n == 1 => "every day".to_string(),
        Recurrence::Daily { .. } => format!("every {n} days"),
        Recurrence::Weekly { days_of_week, .. } => {
            let days: Vec<String> = days_of_week.iter().map(|d| d.to_string()).collect();
            let every = if n == 1 { "every week".to_string() } else { format!("every {n} weeks") };
            format!("{every} on {}", days.join(", "))
        }
        Recurrence::Monthly { days_of_month, .. } => {
            let days: Vec<String> = days_of_month.iter().map(|d| d.to_string()).collect();
            let every = if n == 1 { "every month".to_string() } else { format!("every {n} months") };
            format!("{every} on day {}", days.join(", "))
        }
    };
    if let Some(time) = rule.time_of_day {
        text.push_str(&format!(" at {}", time.format("%H:%M")));
    }
    text
}

pub fn print_habit(h: &Habit) {
    println!("Habit: {} ({})", h.title, h.id);
    if let Some(ref desc) = h.description {
        println!("  Description: {desc}");
    }
    println!("  Schedule: {} (from {})", describe_rule(&h.rule), h.rule.start_date);
    println!("  Priority: {}", h.priority.as_str());
    println!("  Active: {}", if h.is_active { "yes" } else { "paused" });
}

pub fn print_habit_list(habits: &[Habit]) {
    if habits.is_empty() {
        println!("No habits found.");
        return;
    }
    for h in habits {
        let paused = if h.is_active { "" } else { " [paused]" };
        println!("  {} ({}) - {}{}", h.title, short(&h.id), describe_rule(&h.rule), paused);
    }
}

pub fn print_task(t: &TaskInstance) {
    println!("Task: {} ({})", t.title, t.id);
    if let Some(ref desc) = t.description {
        println!("  Description: {desc}");
    }
    println!("  Status: {}", t.status.as_str());
    println!("  Priority: {}", t.priority.as_str());
    if let Some(date) = t.assigned_date {
        println!("  Date: {date}");
    }
    if let Some(time) = t.reminder_time {
        println!("  Reminder: {}", time.format("%H:%M"));
    }
    if let Some(due) = t.due_date {
        println!("  Due: {due}");
    }
    if let Some(ref completed) = t.completed_at {
        println!("  Completed: {completed}");
    }
}

pub fn print_task_list(tasks: &[TaskInstance]) {
    if tasks.is_empty() {
        println!("No tasks found.");
        return;
    }
    for t in tasks {
        let date = t.assigned_date.map(|d| d.to_string()).unwrap_or_default();
        println!("  [{}] {} ({}) {}", t.status.as_str(), t.title, short(&t.id), date);
    }
}

pub fn print_project(p: &Project) {
    println!("Project: {} ({})", p.name, p.id);
    println!("  Title: {}", p.title);
    if let Some(ref desc) = p.description {
        println!("  Description: {desc}");
    }
    println!("  Status: {}", p.status.as_str());
    println!("  Progress: {}%", p.progress);
}

pub fn print_project_list(projects: &[Project]) {
    if projects.is_empty() {
        println!("No projects found.");
        return;
    }
    for p in projects {
        println!("  {} ({}) [{}] {}% - {}", p.name, short(&p.id), p.status.as_str(), p.progress, p.title);
    }
}

pub fn print_steps(steps: &[ProjectStep]) {
    for s in steps {
        let task = s.converted_task_id.as_deref().map(short).unwrap_or("-");
        println!("  {}. [{}] {} (task {})", s.order_number, s.status.as_str(), s.title, task);
    }
}

pub fn print_rate(r: &CompletionRate, streak: u32) {
    println!(
        "Completion: {:.0}% ({}/{}) from {} to {}",
        r.rate * 100.0,
        r.completed,
        r.expected,
        r.window_start,
        r.window_end
    );
    println!("Streak: {streak}");
}

pub fn print_regeneration(summaries: &[RegenerationSummary]) {
    if summaries.is_empty() {
        println!("No habits to regenerate.");
        return;
    }
    for s in summaries {
        let status = match s.status {
            RegenerationStatus::Success => "ok",
            RegenerationStatus::Failed => "FAILED",
        };
        println!("  {}: {} ({} regenerated)", s.user_id, status, s.regenerated);
        for f in &s.failures {
            println!("    {}: {}", f.habit_id, f.error);
        }
    }
}
