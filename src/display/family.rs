//! User and family display formatting

use crate::models::{Family, User};

pub fn format_user_list(users: &[User]) -> String {
    if users.is_empty() {
        return "No users found.".to_string();
    }

    let name_width = users
        .iter()
        .map(|u| u.name.chars().count())
        .max()
        .unwrap_or(4)
        .max(4);

    let mut output = String::new();
    for user in users {
        output.push_str(&format!(
            "  {:<12}  {:<name_width$}  {}\n",
            user.id.to_string(),
            user.name,
            user.email,
            name_width = name_width,
        ));
    }
    output
}

/// Family header, invite code and active members
pub fn format_family(family: &Family, members: &[User]) -> String {
    let mut output = String::new();
    output.push_str(&format!("Family: {} ({})\n", family.name, family.id));
    output.push_str(&format!("  Invite code: {}\n", family.invite_code));
    output.push_str(&format!("  Members ({}):\n", members.len()));
    for member in members {
        let marker = if member.id == family.created_by {
            " (creator)"
        } else {
            ""
        };
        output.push_str(&format!("    {}{}\n", member, marker));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_family_marks_creator() {
        let ana = User::new("Ana", "ana@example.com");
        let family = Family::new("Silva", ana.id);

        let output = format_family(&family, &[ana]);
        assert!(output.contains(&family.invite_code));
        assert!(output.contains("Ana <ana@example.com> (creator)"));
    }
}
