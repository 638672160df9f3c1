use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::error::{BookError, BookResult};
use crate::models::{
    Contact, ContactId, ContactInput, Event, EventId, EventInput, Group, GroupId, GroupInput,
};

/// Single owner of the contact, event and group collections.
///
/// Every mutating method restores the membership invariants before it
/// returns:
/// - a non-empty `contact.group` names a group whose members contain it,
/// - a group's members all carry that group's name as their label,
/// - event participants and group members never repeat a contact,
/// - deleted contacts vanish from every group and event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Store {
    contacts: Vec<Contact>,
    events: Vec<Event>,
    groups: Vec<Group>,
}

/// An inconsistency found by [`Store::violations`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    DanglingGroupLabel { contact: ContactId, group: String },
    MissingMember { contact: ContactId, group: GroupId },
    StrayMember { contact: ContactId, group: GroupId },
    UnknownMember { contact: ContactId, group: GroupId },
    DuplicateMember { contact: ContactId, group: GroupId },
    UnknownParticipant { contact: ContactId, event: EventId },
    DuplicateParticipant { contact: ContactId, event: EventId },
    DuplicateGroupName { name: String },
}

fn require(value: &str, field: &str) -> BookResult<()> {
    if value.trim().is_empty() {
        return Err(BookError::required(field));
    }
    Ok(())
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_parts(contacts: Vec<Contact>, events: Vec<Event>, groups: Vec<Group>) -> Self {
        Self {
            contacts,
            events,
            groups,
        }
    }

    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty() && self.events.is_empty() && self.groups.is_empty()
    }

    pub fn contact(&self, id: ContactId) -> Option<&Contact> {
        self.contacts.iter().find(|c| c.id == id)
    }

    pub fn event(&self, id: EventId) -> Option<&Event> {
        self.events.iter().find(|e| e.id == id)
    }

    pub fn group(&self, id: GroupId) -> Option<&Group> {
        self.groups.iter().find(|g| g.id == id)
    }

    /// First contact carrying `name`. Duplicate names are never disambiguated.
    pub fn find_contact_by_name(&self, name: &str) -> Option<&Contact> {
        self.contacts.iter().find(|c| c.name == name)
    }

    pub fn find_group_by_name(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Filtered view of the contacts. Name and email match case-insensitively,
    /// phone matches case-sensitively. An empty query returns everything.
    pub fn search_contacts(&self, query: &str) -> Vec<&Contact> {
        if query.is_empty() {
            return self.contacts.iter().collect();
        }
        let lowered = query.to_lowercase();
        self.contacts
            .iter()
            .filter(|c| {
                c.name.to_lowercase().contains(&lowered)
                    || c.phone.contains(query)
                    || c.email.to_lowercase().contains(&lowered)
            })
            .collect()
    }

    pub fn group_members(&self, id: GroupId) -> BookResult<Vec<&Contact>> {
        let group = self
            .group(id)
            .ok_or_else(|| BookError::NotFound(format!("group {id}")))?;
        Ok(group.members.iter().filter_map(|m| self.contact(*m)).collect())
    }

    pub fn event_participants(&self, id: EventId) -> BookResult<Vec<&Contact>> {
        let event = self
            .event(id)
            .ok_or_else(|| BookError::NotFound(format!("event {id}")))?;
        Ok(event
            .participants
            .iter()
            .filter_map(|p| self.contact(*p))
            .collect())
    }

    // ── contacts ────────────────────────────────────────────────────────────

    pub fn add_contact(&mut self, input: ContactInput) -> BookResult<ContactId> {
        require(&input.name, "name")?;
        require(&input.phone, "phone")?;

        let id = ContactId::new();
        self.contacts.push(Contact {
            id,
            name: input.name,
            phone: input.phone,
            email: input.email,
            group: String::new(),
        });
        self.assign_group_label(id, &input.group);
        debug!("contact added id={}", id);
        Ok(id)
    }

    /// Applies new field values. A group change detaches from the old group
    /// before attaching to the new one.
    pub fn update_contact(&mut self, id: ContactId, input: ContactInput) -> BookResult<()> {
        require(&input.name, "name")?;
        require(&input.phone, "phone")?;
        let ci = self.contact_index(id)?;

        let group_changed = self.contacts[ci].group != input.group;
        if group_changed {
            self.detach(id);
        }

        let contact = &mut self.contacts[ci];
        contact.name = input.name;
        contact.phone = input.phone;
        contact.email = input.email;

        if group_changed {
            self.assign_group_label(id, &input.group);
        }
        debug!("contact updated id={}", id);
        Ok(())
    }

    /// Removes the contact and every group membership and participation
    /// that references it.
    pub fn delete_contact(&mut self, id: ContactId) -> BookResult<Contact> {
        let ci = self.contact_index(id)?;
        let removed = self.contacts.remove(ci);
        for group in &mut self.groups {
            group.members.retain(|m| *m != id);
        }
        for event in &mut self.events {
            event.participants.retain(|p| *p != id);
        }
        debug!("contact deleted id={}", id);
        Ok(removed)
    }

    // ── events ──────────────────────────────────────────────────────────────

    pub fn add_event(&mut self, input: EventInput) -> BookResult<EventId> {
        require(&input.title, "title")?;
        require(&input.date, "date")?;
        require(&input.time, "time")?;

        let id = EventId::new();
        self.events.push(Event {
            id,
            title: input.title,
            date: input.date,
            time: input.time,
            location: input.location,
            participants: vec![],
        });
        debug!("event added id={}", id);
        Ok(id)
    }

    pub fn delete_event(&mut self, id: EventId) -> BookResult<Event> {
        let ei = self.event_index(id)?;
        debug!("event deleted id={}", id);
        Ok(self.events.remove(ei))
    }

    /// Idempotent. Returns whether the contact was newly added.
    pub fn add_participant(&mut self, event: EventId, contact: ContactId) -> BookResult<bool> {
        let ei = self.event_index(event)?;
        self.contact_index(contact)?;
        let participants = &mut self.events[ei].participants;
        if participants.contains(&contact) {
            return Ok(false);
        }
        participants.push(contact);
        Ok(true)
    }

    /// Tolerant: removing an absent participant is a no-op returning `false`.
    pub fn remove_participant(&mut self, event: EventId, contact: ContactId) -> BookResult<bool> {
        let ei = self.event_index(event)?;
        let participants = &mut self.events[ei].participants;
        let before = participants.len();
        participants.retain(|p| *p != contact);
        Ok(participants.len() != before)
    }

    // ── groups ──────────────────────────────────────────────────────────────

    pub fn add_group(&mut self, input: GroupInput) -> BookResult<GroupId> {
        require(&input.name, "name")?;
        self.ensure_group_name_free(&input.name, None)?;

        let id = GroupId::new();
        self.groups.push(Group {
            id,
            name: input.name,
            description: input.description,
            members: vec![],
        });
        debug!("group added id={}", id);
        Ok(id)
    }

    /// Edits the group in place. A rename is carried to every member's label.
    pub fn update_group(&mut self, id: GroupId, input: GroupInput) -> BookResult<()> {
        require(&input.name, "name")?;
        let gi = self.group_index(id)?;
        if self.groups[gi].name != input.name {
            self.ensure_group_name_free(&input.name, Some(id))?;
        }

        let old_name = std::mem::replace(&mut self.groups[gi].name, input.name);
        self.groups[gi].description = input.description;

        let new_name = &self.groups[gi].name;
        if old_name != *new_name {
            let members = &self.groups[gi].members;
            for contact in &mut self.contacts {
                if members.contains(&contact.id) {
                    contact.group = new_name.clone();
                }
            }
            debug!("group renamed id={} members={}", id, members.len());
        }
        Ok(())
    }

    /// Removes the group and clears the label of every former member.
    /// The contacts themselves are kept.
    pub fn delete_group(&mut self, id: GroupId) -> BookResult<Group> {
        let gi = self.group_index(id)?;
        let removed = self.groups.remove(gi);
        for contact in &mut self.contacts {
            if contact.group == removed.name || removed.members.contains(&contact.id) {
                contact.group.clear();
            }
        }
        debug!("group deleted id={}", id);
        Ok(removed)
    }

    /// The authoritative membership toggle. Updates `group.members` and
    /// `contact.group` together; joining a group leaves any previous one.
    pub fn set_group_membership(
        &mut self,
        group: GroupId,
        contact: ContactId,
        included: bool,
    ) -> BookResult<()> {
        let gi = self.group_index(group)?;
        let ci = self.contact_index(contact)?;
        let is_member = self.groups[gi].has_member(contact);
        let labelled = self.contacts[ci].group == self.groups[gi].name;

        if included {
            if is_member && labelled {
                return Ok(());
            }
            self.detach(contact);
            self.attach(gi, contact);
        } else if is_member || labelled {
            self.detach(contact);
        }
        Ok(())
    }

    // ── integrity ───────────────────────────────────────────────────────────

    /// Lists every broken membership or participation invariant.
    pub fn violations(&self) -> Vec<Violation> {
        let mut found = Vec::new();

        let mut names = HashSet::new();
        for group in &self.groups {
            if !names.insert(group.name.as_str()) {
                found.push(Violation::DuplicateGroupName {
                    name: group.name.clone(),
                });
            }
        }

        for contact in &self.contacts {
            if !contact.in_group() {
                continue;
            }
            match self.find_group_by_name(&contact.group) {
                None => found.push(Violation::DanglingGroupLabel {
                    contact: contact.id,
                    group: contact.group.clone(),
                }),
                Some(group) if !group.has_member(contact.id) => {
                    found.push(Violation::MissingMember {
                        contact: contact.id,
                        group: group.id,
                    })
                }
                Some(_) => {}
            }
        }

        for group in &self.groups {
            let mut seen = HashSet::new();
            for member in &group.members {
                if !seen.insert(*member) {
                    found.push(Violation::DuplicateMember {
                        contact: *member,
                        group: group.id,
                    });
                    continue;
                }
                match self.contact(*member) {
                    None => found.push(Violation::UnknownMember {
                        contact: *member,
                        group: group.id,
                    }),
                    Some(contact) if contact.group != group.name => {
                        found.push(Violation::StrayMember {
                            contact: *member,
                            group: group.id,
                        })
                    }
                    Some(_) => {}
                }
            }
        }

        for event in &self.events {
            let mut seen = HashSet::new();
            for participant in &event.participants {
                if !seen.insert(*participant) {
                    found.push(Violation::DuplicateParticipant {
                        contact: *participant,
                        event: event.id,
                    });
                } else if self.contact(*participant).is_none() {
                    found.push(Violation::UnknownParticipant {
                        contact: *participant,
                        event: event.id,
                    });
                }
            }
        }

        found
    }

    /// Brings a freshly loaded store back in line with the invariants,
    /// treating each contact's group label as authoritative. When two groups
    /// share a name the first one owns the label. Returns the number of fixes.
    pub fn repair(&mut self) -> usize {
        let mut fixes = 0;
        let known: HashSet<ContactId> = self.contacts.iter().map(|c| c.id).collect();

        for event in &mut self.events {
            fixes += dedupe_known(&mut event.participants, &known);
        }
        for group in &mut self.groups {
            fixes += dedupe_known(&mut group.members, &known);
        }
        fixes += self.rename_duplicate_groups();

        for ci in 0..self.contacts.len() {
            let label = &self.contacts[ci].group;
            if !label.is_empty() && self.group_index_by_name(label).is_none() {
                warn!(
                    "clearing group label `{}` on contact id={}: no such group",
                    label, self.contacts[ci].id
                );
                self.contacts[ci].group.clear();
                fixes += 1;
            }
        }

        for gi in 0..self.groups.len() {
            let before = self.groups[gi].members.len();
            let owned: Vec<ContactId> = self.groups[gi]
                .members
                .iter()
                .copied()
                .filter(|m| {
                    self.contact(*m)
                        .and_then(|c| self.group_index_by_name(&c.group))
                        == Some(gi)
                })
                .collect();
            fixes += before - owned.len();
            self.groups[gi].members = owned;
        }

        for ci in 0..self.contacts.len() {
            let id = self.contacts[ci].id;
            if let Some(gi) = self.group_index_by_name(&self.contacts[ci].group) {
                if !self.groups[gi].has_member(id) {
                    self.groups[gi].members.push(id);
                    fixes += 1;
                }
            }
        }

        if fixes > 0 {
            info!("repaired {} membership inconsistencies", fixes);
        }
        fixes
    }

    /// Gives every later group sharing a name with an earlier one a fresh
    /// `Name (2)` style name. Members that only belong to the renamed group
    /// follow it; contacts also listed by the earlier group stay there.
    fn rename_duplicate_groups(&mut self) -> usize {
        let mut fixes = 0;
        for gi in 1..self.groups.len() {
            let name = self.groups[gi].name.clone();
            let Some(first) = self.groups[..gi].iter().position(|g| g.name == name) else {
                continue;
            };
            let renamed = self.unused_group_name(&name);
            warn!(
                "renaming duplicate group `{}` id={} to `{}`",
                name, self.groups[gi].id, renamed
            );

            let claimed = &self.groups[first].members;
            let own = &self.groups[gi].members;
            for contact in &mut self.contacts {
                if contact.group == name
                    && own.contains(&contact.id)
                    && !claimed.contains(&contact.id)
                {
                    contact.group = renamed.clone();
                }
            }
            self.groups[gi].name = renamed;
            fixes += 1;
        }
        fixes
    }

    fn unused_group_name(&self, base: &str) -> String {
        let mut n = 2;
        loop {
            let candidate = format!("{base} ({n})");
            if self.groups.iter().all(|g| g.name != candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    // ── internals ───────────────────────────────────────────────────────────

    fn contact_index(&self, id: ContactId) -> BookResult<usize> {
        self.contacts
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| BookError::NotFound(format!("contact {id}")))
    }

    fn event_index(&self, id: EventId) -> BookResult<usize> {
        self.events
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| BookError::NotFound(format!("event {id}")))
    }

    fn group_index(&self, id: GroupId) -> BookResult<usize> {
        self.groups
            .iter()
            .position(|g| g.id == id)
            .ok_or_else(|| BookError::NotFound(format!("group {id}")))
    }

    fn group_index_by_name(&self, name: &str) -> Option<usize> {
        if name.is_empty() {
            return None;
        }
        self.groups.iter().position(|g| g.name == name)
    }

    fn ensure_group_name_free(&self, name: &str, except: Option<GroupId>) -> BookResult<()> {
        let taken = self
            .groups
            .iter()
            .any(|g| g.name == name && Some(g.id) != except);
        if taken {
            return Err(BookError::Validation(format!(
                "group name `{name}` is already in use"
            )));
        }
        Ok(())
    }

    /// Joins the named group when it exists. Unknown names leave the
    /// contact unaffiliated.
    fn assign_group_label(&mut self, contact: ContactId, label: &str) {
        if label.is_empty() {
            return;
        }
        match self.group_index_by_name(label) {
            Some(gi) => self.attach(gi, contact),
            None => warn!(
                "group `{}` does not exist; contact id={} left without a group",
                label, contact
            ),
        }
    }

    fn attach(&mut self, gi: usize, contact: ContactId) {
        let group = &mut self.groups[gi];
        if !group.members.contains(&contact) {
            group.members.push(contact);
        }
        let name = group.name.clone();
        if let Some(c) = self.contacts.iter_mut().find(|c| c.id == contact) {
            c.group = name;
        }
    }

    fn detach(&mut self, contact: ContactId) {
        for group in &mut self.groups {
            group.members.retain(|m| *m != contact);
        }
        if let Some(c) = self.contacts.iter_mut().find(|c| c.id == contact) {
            c.group.clear();
        }
    }

    // ── seeding ─────────────────────────────────────────────────────────────

    pub fn seed_data(&mut self) -> BookResult<()> {
        struct SeedContact {
            name: &'static str,
            phone: &'static str,
            email: &'static str,
            group: &'static str,
        }

        let groups = [
            ("Family", "Parents, siblings and cousins"),
            ("Friends", "People we actually call back"),
            ("Work", "Colleagues and clients"),
        ];
        for (name, description) in groups {
            self.add_group(GroupInput::new(name, description))?;
        }

        let seeds = vec![
            SeedContact {
                name: "Dana Levi",
                phone: "050-1111111",
                email: "dana.levi@example.com",
                group: "Family",
            },
            SeedContact {
                name: "Yossi Cohen",
                phone: "052-2222222",
                email: "",
                group: "Family",
            },
            SeedContact {
                name: "Maya Friedman",
                phone: "054-3333333",
                email: "maya@example.org",
                group: "Friends",
            },
            SeedContact {
                name: "Avi Mizrahi",
                phone: "053-4444444",
                email: "avi.mizrahi@work.example",
                group: "Work",
            },
            SeedContact {
                name: "Noa Shapiro",
                phone: "058-5555555",
                email: "noa.shapiro@work.example",
                group: "Work",
            },
            SeedContact {
                name: "Eitan Bar",
                phone: "050-6666666",
                email: "",
                group: "",
            },
        ];

        let mut ids = Vec::with_capacity(seeds.len());
        for seed in &seeds {
            ids.push(self.add_contact(ContactInput::new(
                seed.name,
                seed.phone,
                seed.email,
                seed.group,
            ))?);
        }

        let standup = self.add_event(EventInput::new("Standup", "01/01/2025", "09:00", "Office"))?;
        for id in &ids[3..5] {
            self.add_participant(standup, *id)?;
        }
        let dinner = self.add_event(EventInput::new(
            "Family dinner",
            "03/01/2025",
            "19:30",
            "Grandma's",
        ))?;
        for id in &ids[0..2] {
            self.add_participant(dinner, *id)?;
        }

        Ok(())
    }
}

/// Drops unknown and repeated ids, keeping first occurrences in order.
fn dedupe_known(ids: &mut Vec<ContactId>, known: &HashSet<ContactId>) -> usize {
    let before = ids.len();
    let mut seen = HashSet::new();
    ids.retain(|id| known.contains(id) && seen.insert(*id));
    before - ids.len()
}
