//! Deterministic keyword responder used when no live provider is enabled.
//!
//! The lower-cased input is tested against topic keyword groups in a fixed
//! order; the first group with a substring hit answers. Output depends only
//! on the input and the profile.

use crate::profile::Profile;

/// Projects shown in the projects answer
pub const PROJECT_LIMIT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    Greeting,
    Skills,
    Projects,
    Contact,
    Experience,
    Education,
    Achievements,
    About,
    Menu,
}

/// Priority order: earlier groups win ties.
const KEYWORD_GROUPS: &[(Topic, &[&str])] = &[
    (Topic::Greeting, &["hello", "hi", "hey"]),
    (
        Topic::Skills,
        &["skill", "tech", "stack", "language", "framework", "tool"],
    ),
    (Topic::Projects, &["project", "portfolio", "built", "build"]),
    (
        Topic::Contact,
        &["contact", "email", "reach", "linkedin", "github", "hire"],
    ),
    (
        Topic::Experience,
        &["experience", "work", "job", "career", "company", "employ"],
    ),
    (
        Topic::Education,
        &["education", "degree", "university", "college", "school", "stud"],
    ),
    (
        Topic::Achievements,
        &["achievement", "award", "accomplish", "certif", "hackathon"],
    ),
    (
        Topic::About,
        &["about", "who are you", "yourself", "introduce", "background"],
    ),
];

const MENU: &str = "I can tell you about:\n\
• Skills and technologies\n\
• Projects\n\
• Work experience\n\
• Education\n\
• Achievements\n\
• How to get in touch\n\n\
What would you like to know?";

pub fn classify(input: &str) -> Topic {
    let lowered = input.to_lowercase();
    KEYWORD_GROUPS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lowered.contains(k)))
        .map(|(topic, _)| *topic)
        .unwrap_or(Topic::Menu)
}

pub struct FallbackResponder {
    profile: Profile,
}

impl FallbackResponder {
    pub fn new(profile: Profile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn respond(&self, input: &str) -> String {
        match classify(input) {
            Topic::Greeting => self.greeting(),
            Topic::Skills => self.skills(),
            Topic::Projects => self.projects(),
            Topic::Contact => self.contact(),
            Topic::Experience => self.experience(),
            Topic::Education => self.education(),
            Topic::Achievements => self.achievements(),
            Topic::About => self.about(),
            Topic::Menu => MENU.to_string(),
        }
    }

    fn greeting(&self) -> String {
        let p = &self.profile;
        format!(
            "Hello! 👋 I'm {}'s assistant. {} is a {}.\n\
             Ask me about skills, projects, experience, education, achievements or how to get in touch.",
            p.name, p.name, p.title
        )
    }

    fn skills(&self) -> String {
        let p = &self.profile;
        if p.skills.is_empty() {
            return format!("{} hasn't listed any skills yet.", p.name);
        }
        let lines: Vec<String> = p
            .skills
            .iter()
            .map(|group| format!("• {}: {}", group.category, group.items.join(", ")))
            .collect();
        format!("Here are {}'s skills:\n\n{}", p.name, lines.join("\n"))
    }

    fn projects(&self) -> String {
        let p = &self.profile;
        if p.projects.is_empty() {
            return format!("{} hasn't listed any projects yet.", p.name);
        }
        let mut out = format!("Some projects {} has worked on:\n", p.name);
        for project in p.projects.iter().take(PROJECT_LIMIT) {
            out.push_str(&format!("\n• {}: {}", project.name, project.description));
            if !project.tech.is_empty() {
                out.push_str(&format!("\n  Tech: {}", project.tech.join(", ")));
            }
            if let Some(link) = &project.link {
                out.push_str(&format!("\n  Link: {}", link));
            }
        }
        let remaining = p.projects.len().saturating_sub(PROJECT_LIMIT);
        if remaining > 0 {
            out.push_str(&format!("\n\n...and {} more.", remaining));
        }
        out
    }

    fn contact(&self) -> String {
        let c = &self.profile.contact;
        let fields = [
            ("Email", &c.email),
            ("GitHub", &c.github),
            ("LinkedIn", &c.linkedin),
            ("Location", &c.location),
        ];
        let lines: Vec<String> = fields
            .iter()
            .filter_map(|(label, value)| value.as_ref().map(|v| format!("• {}: {}", label, v)))
            .collect();
        if lines.is_empty() {
            return "Contact details aren't listed yet.".to_string();
        }
        format!("You can reach {} here:\n\n{}", self.profile.name, lines.join("\n"))
    }

    fn experience(&self) -> String {
        let p = &self.profile;
        if p.work.is_empty() {
            return format!("{} hasn't listed any work history yet.", p.name);
        }
        let mut out = format!("{}'s work experience:\n", p.name);
        for job in &p.work {
            out.push_str(&format!("\n• {} at {} ({})", job.role, job.company, job.period));
            for highlight in &job.highlights {
                out.push_str(&format!("\n  - {}", highlight));
            }
        }
        out
    }

    fn education(&self) -> String {
        let p = &self.profile;
        if p.education.is_empty() {
            return format!("{} hasn't listed any education yet.", p.name);
        }
        let lines: Vec<String> = p
            .education
            .iter()
            .map(|e| format!("• {}, {} ({})", e.degree, e.institution, e.period))
            .collect();
        format!("{}'s education:\n\n{}", p.name, lines.join("\n"))
    }

    fn achievements(&self) -> String {
        let p = &self.profile;
        if p.achievements.is_empty() {
            return format!("{} hasn't listed any achievements yet.", p.name);
        }
        let lines: Vec<String> = p.achievements.iter().map(|a| format!("• {}", a)).collect();
        format!("Some highlights:\n\n{}", lines.join("\n"))
    }

    fn about(&self) -> String {
        let p = &self.profile;
        format!("{}, {}\n\n{}", p.name, p.title, p.about)
    }
}
